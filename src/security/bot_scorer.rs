//! Signup bot scoring.
//!
//! Checks run in order and the first block wins:
//! 1. an account with this email was created inside the window
//! 2. this IP reached the signup threshold inside the window
//! 3. the newest signal for this email, IP or fingerprint is a block
//! 4. otherwise score the attempt, persist a signal at or above the score threshold,
//!    and allow

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{compute_fingerprint, AuditEventType, AuditSeverity};
use crate::context::RequestContext;
use crate::error::RewardResult;
use crate::models::{normalize_email, BotSignal, FlaggedReason, SignupEvent};
use crate::store::Store;

/// Bot scoring thresholds (configurable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotThresholds {
    /// Look-back window for the email and IP velocity checks
    pub window_minutes: i64,

    /// Signups from one IP inside the window (this attempt included) that trigger a block
    pub ip_signup_threshold: u64,

    /// Score at which a non-blocking signal is persisted
    pub score_threshold: i32,

    /// Added when the user agent is absent or shorter than `min_user_agent_len`
    pub short_user_agent_penalty: i32,
    pub min_user_agent_len: usize,

    /// Score stored on the blocking IP velocity signal
    pub ip_block_score: i32,
}

impl Default for BotThresholds {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            ip_signup_threshold: 3,
            score_threshold: 50,
            short_user_agent_penalty: 20,
            min_user_agent_len: 10,
            ip_block_score: 100,
        }
    }
}

impl BotThresholds {
    pub fn window(&self) -> Duration {
        Duration::minutes(self.window_minutes)
    }
}

/// Request attributes the shell extracts from a signup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignupAttempt {
    pub email: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
}

impl SignupAttempt {
    pub fn new(email: &str, ip: &str) -> Self {
        Self {
            email: email.to_string(),
            ip: ip.to_string(),
            ..Default::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn fingerprint(&self) -> String {
        compute_fingerprint(
            &self.ip,
            self.user_agent.as_deref(),
            self.accept_language.as_deref(),
            self.accept_encoding.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    TooManyFromEmail,
    TooManyFromIp,
    SecurityBlock,
}

impl BlockReason {
    pub fn message(&self) -> &'static str {
        match self {
            BlockReason::TooManyFromEmail => "Too many signup attempts from this email",
            BlockReason::TooManyFromIp => "Too many signup attempts from this IP",
            BlockReason::SecurityBlock => "Signup blocked for security reasons",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotVerdict {
    pub allow: bool,
    pub block_reason: Option<BlockReason>,
    pub score: i32,
    pub fingerprint: String,
}

impl BotVerdict {
    fn blocked(reason: BlockReason, score: i32, fingerprint: String) -> Self {
        Self {
            allow: false,
            block_reason: Some(reason),
            score,
            fingerprint,
        }
    }
}

#[derive(Clone)]
pub struct BotScorer {
    store: Arc<dyn Store>,
    thresholds: BotThresholds,
}

impl BotScorer {
    pub fn new(store: Arc<dyn Store>, thresholds: BotThresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn thresholds(&self) -> &BotThresholds {
        &self.thresholds
    }

    pub async fn evaluate(
        &self,
        ctx: &RequestContext,
        attempt: &SignupAttempt,
    ) -> RewardResult<BotVerdict> {
        let email = normalize_email(&attempt.email);
        let fingerprint = attempt.fingerprint();
        let since = ctx.now - self.thresholds.window();

        if let Some(account) = self.store.find_account_by_email(&email).await? {
            if account.created_at >= since {
                return Ok(self
                    .block(ctx, &email, BlockReason::TooManyFromEmail, 0, fingerprint)
                    .await);
            }
        }

        if !attempt.ip.is_empty() {
            let prior = self.store.count_signups_from_ip(&attempt.ip, since).await?;
            let signups = prior + 1;
            if signups >= self.thresholds.ip_signup_threshold {
                let signal = BotSignal {
                    id: Uuid::new_v4(),
                    email: Some(email.clone()),
                    ip: Some(attempt.ip.clone()),
                    fingerprint: Some(fingerprint.clone()),
                    score: self.thresholds.ip_block_score,
                    flagged_reasons: vec![FlaggedReason::IpVelocity { signups }],
                    blocked: true,
                    created_at: ctx.now,
                };
                self.store.insert_bot_signal(&signal).await?;
                return Ok(self
                    .block(
                        ctx,
                        &email,
                        BlockReason::TooManyFromIp,
                        signal.score,
                        fingerprint,
                    )
                    .await);
            }
        }

        let latest = self
            .store
            .latest_bot_signal(&email, &attempt.ip, &fingerprint)
            .await?;
        if let Some(signal) = &latest {
            if signal.blocked {
                return Ok(self
                    .block(
                        ctx,
                        &email,
                        BlockReason::SecurityBlock,
                        signal.score,
                        fingerprint,
                    )
                    .await);
            }
        }

        let mut reasons = Vec::new();
        let mut score = latest.as_ref().map(|s| s.score).unwrap_or(0);
        if score > 0 {
            reasons.push(FlaggedReason::PriorSignal { score });
        }
        match attempt.user_agent.as_deref().map(str::trim) {
            None | Some("") => {
                score += self.thresholds.short_user_agent_penalty;
                reasons.push(FlaggedReason::MissingUserAgent);
            }
            Some(ua) if ua.chars().count() < self.thresholds.min_user_agent_len => {
                score += self.thresholds.short_user_agent_penalty;
                reasons.push(FlaggedReason::ShortUserAgent {
                    length: ua.chars().count(),
                });
            }
            Some(_) => {}
        }

        if score >= self.thresholds.score_threshold {
            let descriptions: Vec<String> = reasons.iter().map(FlaggedReason::description).collect();
            let signal = BotSignal {
                id: Uuid::new_v4(),
                email: Some(email.clone()),
                ip: Some(attempt.ip.clone()).filter(|ip| !ip.is_empty()),
                fingerprint: Some(fingerprint.clone()),
                score,
                flagged_reasons: reasons,
                blocked: false,
                created_at: ctx.now,
            };
            self.store.insert_bot_signal(&signal).await?;
            self.store.raise_bot_score(&email, score).await?;

            warn!(
                request_id = %ctx.request_id,
                email = %email,
                score,
                reasons = %descriptions.join(", "),
                "Suspicious signup recorded"
            );
            ctx.audit(
                AuditEventType::SuspicionRecorded {
                    email: email.clone(),
                    score,
                    reasons: descriptions,
                },
                AuditSeverity::Warning,
            )
            .await;
        } else {
            debug!(request_id = %ctx.request_id, score, "Signup scored");
        }

        Ok(BotVerdict {
            allow: true,
            block_reason: None,
            score,
            fingerprint,
        })
    }

    /// Append the signup event the IP velocity check counts. Called by the shell
    /// after a signup it accepted.
    pub async fn record_signup(
        &self,
        ctx: &RequestContext,
        attempt: &SignupAttempt,
        fingerprint: &str,
    ) -> RewardResult<()> {
        let event = SignupEvent {
            email: normalize_email(&attempt.email),
            ip: attempt.ip.clone(),
            fingerprint: fingerprint.to_string(),
            created_at: ctx.now,
        };
        self.store.record_signup_event(&event).await?;
        Ok(())
    }

    async fn block(
        &self,
        ctx: &RequestContext,
        email: &str,
        reason: BlockReason,
        score: i32,
        fingerprint: String,
    ) -> BotVerdict {
        warn!(
            request_id = %ctx.request_id,
            email = %email,
            reason = ?reason,
            "Signup blocked"
        );
        ctx.audit(
            AuditEventType::SignupBlocked {
                email: email.to_string(),
                reason: reason.message().to_string(),
            },
            AuditSeverity::Warning,
        )
        .await;
        BotVerdict::blocked(reason, score, fingerprint)
    }
}
