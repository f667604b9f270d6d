//! blogwrites - runs the write patterns against the configured database

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blogwrites::{config::Config, db, runner};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogwrites=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting blogwrites...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Connect, failing fast when the store is unreachable
    let pool = match db::create_pool(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Database connected: {} ({})",
        config.database.driver,
        db::redact_url(&config.database.url)
    );

    // Run migrations
    if let Err(e) = db::migrations::run_migrations(&pool).await {
        tracing::error!("Database migrations failed: {:#}", e);
        pool.close().await;
        std::process::exit(1);
    }
    tracing::info!("Database migrations completed");

    finish(runner::run(pool, &config.run).await)
}

/// Report the outcome of a run that reached the store.
///
/// A failed step was already logged by the runner and the pool closed, so
/// the process still ends normally. Only an unreachable store exits non-zero.
fn finish(outcome: Result<runner::RunSummary, runner::RunError>) -> Result<()> {
    match outcome {
        Ok(summary) => tracing::info!(
            users_created = summary.users_created,
            upserted = summary.upserted.len(),
            raw_inserted = summary.raw_sql.inserted,
            concurrent_comments = summary.concurrent.comments.len(),
            "Run finished"
        ),
        Err(e) => tracing::warn!("Run stopped at step {}", e.step),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogwrites::error::WriteError;
    use blogwrites::runner::{RunError, Step};

    #[test]
    fn test_failed_step_does_not_fail_process() {
        let outcome = Err(RunError {
            step: Step::UserInteraction,
            source: WriteError::precondition("User not found: nobody@example.com"),
        });

        assert!(finish(outcome).is_ok());
    }
}
