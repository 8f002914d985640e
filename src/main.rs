use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use waitlist_rewards::{
    config::sanitize_for_logging, AuditLogger, AuditSeverity, DatabasePool, PointsLedger,
    RequestContext, Store, WaitlistConfig,
};

/// Recompute every account's balance from its transaction log and report drift.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = WaitlistConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check WAITLIST_* environment variables.");
        e
    })?;

    init_secure_logging(&config)?;

    if !config.database.postgres_enabled {
        warn!("WAITLIST_POSTGRES_ENABLED is false, nothing to audit");
        return Ok(ExitCode::SUCCESS);
    }

    let url = if config.logging.sanitize_logs {
        sanitize_for_logging(&config.database.postgres_url)
    } else {
        config.database.postgres_url.clone()
    };
    info!(url = %url, "Connecting to PostgreSQL");

    let db = DatabasePool::new(
        &config.database.postgres_url,
        config.database.max_connections,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    db.init_schema().await.context("Failed to initialize schema")?;

    let store: Arc<dyn Store> = Arc::new(db);
    let ledger = PointsLedger::new(store.clone());
    let audit_log = Arc::new(AuditLogger::new());
    let ctx = RequestContext::new(audit_log.clone()).with_actor("waitlist-audit");

    let account_ids = store
        .list_account_ids()
        .await
        .context("Failed to list accounts")?;
    info!(accounts = account_ids.len(), "Auditing balances");

    let mut mismatches = 0usize;
    for account_id in account_ids {
        let audit = ledger
            .verify_balance(&ctx, account_id, None)
            .await
            .with_context(|| format!("Failed to audit account {}", account_id))?;
        if !audit.consistent {
            mismatches += 1;
        }
    }

    let flagged = audit_log.get_by_severity(AuditSeverity::Error).await.len();
    if mismatches > 0 {
        error!(mismatches, flagged, "Balance audit found drift");
        return Ok(ExitCode::FAILURE);
    }

    info!("All balances match their transaction logs");
    Ok(ExitCode::SUCCESS)
}

fn init_secure_logging(config: &WaitlistConfig) -> Result<()> {
    let log_level = match config.logging.level.as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Secure logging initialized with data sanitization enabled");
    }

    Ok(())
}
