use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use url::Url;

use crate::security::BotThresholds;

/// Configuration for the waitlist reward core and its audit binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitlistConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Referral reward amounts
    pub rewards: RewardConfig,
    /// Signup bot scoring
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, waitlist-audit has nothing to check and exits)
    pub postgres_enabled: bool,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/waitlist".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span close events with timings
    pub log_spans: bool,
    /// Mask credentials before they reach the log
    pub sanitize_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_spans: false,
            sanitize_logs: true,
        }
    }
}

/// Points paid when a referral completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub referrer_reward: i64,
    pub referred_reward: i64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            referrer_reward: 150,
            referred_reward: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub window_minutes: i64,
    pub ip_signup_threshold: u64,
    pub score_threshold: i32,
    pub short_user_agent_penalty: i32,
    pub min_user_agent_len: usize,
    pub ip_block_score: i32,
}

impl Default for BotConfig {
    fn default() -> Self {
        let thresholds = BotThresholds::default();
        Self {
            window_minutes: thresholds.window_minutes,
            ip_signup_threshold: thresholds.ip_signup_threshold,
            score_threshold: thresholds.score_threshold,
            short_user_agent_penalty: thresholds.short_user_agent_penalty,
            min_user_agent_len: thresholds.min_user_agent_len,
            ip_block_score: thresholds.ip_block_score,
        }
    }
}

impl BotConfig {
    /// Convert to BotThresholds for use by BotScorer
    pub fn to_thresholds(&self) -> BotThresholds {
        BotThresholds {
            window_minutes: self.window_minutes,
            ip_signup_threshold: self.ip_signup_threshold,
            score_threshold: self.score_threshold,
            short_user_agent_penalty: self.short_user_agent_penalty,
            min_user_agent_len: self.min_user_agent_len,
            ip_block_score: self.ip_block_score,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", key))?;
    }
    Ok(())
}

impl WaitlistConfig {
    /// Load configuration from `WAITLIST_*` environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        // Database configuration
        if let Some(url) = lookup("WAITLIST_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        parse_var(&lookup, "WAITLIST_POSTGRES_ENABLED", &mut config.database.postgres_enabled)?;
        parse_var(&lookup, "WAITLIST_MAX_CONNECTIONS", &mut config.database.max_connections)?;

        // Logging configuration
        if let Some(level) = lookup("WAITLIST_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
        parse_var(&lookup, "WAITLIST_LOG_SPANS", &mut config.logging.log_spans)?;
        parse_var(&lookup, "WAITLIST_SANITIZE_LOGS", &mut config.logging.sanitize_logs)?;

        // Reward configuration
        parse_var(&lookup, "WAITLIST_REFERRER_REWARD", &mut config.rewards.referrer_reward)?;
        parse_var(&lookup, "WAITLIST_REFERRED_REWARD", &mut config.rewards.referred_reward)?;

        // Bot scoring configuration
        parse_var(&lookup, "WAITLIST_BOT_WINDOW_MINUTES", &mut config.bot.window_minutes)?;
        parse_var(&lookup, "WAITLIST_BOT_IP_SIGNUP_THRESHOLD", &mut config.bot.ip_signup_threshold)?;
        parse_var(&lookup, "WAITLIST_BOT_SCORE_THRESHOLD", &mut config.bot.score_threshold)?;
        parse_var(
            &lookup,
            "WAITLIST_BOT_SHORT_UA_PENALTY",
            &mut config.bot.short_user_agent_penalty,
        )?;
        parse_var(&lookup, "WAITLIST_BOT_MIN_UA_LEN", &mut config.bot.min_user_agent_len)?;
        parse_var(&lookup, "WAITLIST_BOT_IP_BLOCK_SCORE", &mut config.bot.ip_block_score)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.database.postgres_enabled {
            let url = Url::parse(&self.database.postgres_url).with_context(|| {
                format!(
                    "Invalid Postgres URL: {}",
                    sanitize_for_logging(&self.database.postgres_url)
                )
            })?;
            if !matches!(url.scheme(), "postgres" | "postgresql") {
                return Err(anyhow::anyhow!(
                    "Postgres URL must use the postgres:// scheme, got {}",
                    url.scheme()
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be non-zero"));
        }

        if !matches!(
            self.logging.level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(anyhow::anyhow!("Unknown log level: {}", self.logging.level));
        }

        if self.rewards.referrer_reward <= 0 || self.rewards.referred_reward <= 0 {
            return Err(anyhow::anyhow!("Referral rewards must be positive"));
        }

        let bot = &self.bot;
        if bot.window_minutes <= 0 {
            return Err(anyhow::anyhow!("Bot window must be positive"));
        }
        if bot.ip_signup_threshold == 0 || bot.score_threshold <= 0 || bot.min_user_agent_len == 0
        {
            return Err(anyhow::anyhow!("Bot thresholds must be non-zero"));
        }
        if bot.short_user_agent_penalty < 0 || bot.ip_block_score < 0 {
            return Err(anyhow::anyhow!("Bot scores cannot be negative"));
        }

        Ok(())
    }
}

/// Sanitize sensitive data for logging. URLs keep everything but their password.
pub fn sanitize_for_logging(data: &str) -> String {
    if let Ok(mut url) = Url::parse(data) {
        if url.password().is_some() && url.set_password(Some("***")).is_ok() {
            return url.to_string();
        }
        if url.has_host() {
            return data.to_string();
        }
    }

    let sensitive_patterns = ["password", "secret", "token", "key", "credential"];
    let data_lower = data.to_lowercase();
    if sensitive_patterns.iter().any(|p| data_lower.contains(p)) {
        let chars: Vec<char> = data.chars().collect();
        let keep = if chars.len() > 20 { 6 } else { 2.min(chars.len()) };
        let head: String = chars[..keep].iter().collect();
        let tail: String = chars[chars.len().saturating_sub(keep)..].iter().collect();
        return format!("{}***{}", head, tail);
    }

    data.to_string()
}
