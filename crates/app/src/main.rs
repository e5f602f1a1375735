use std::sync::Arc;

use ledger::{Engine, SchedulerConfig};
use migration::{Migrator, MigratorTrait};

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "hearth={level},ledger={level}",
            level = settings.app.level
        ))
        .init();

    let timezone: chrono_tz::Tz = settings
        .scheduler
        .timezone
        .parse()
        .map_err(|err| format!("invalid scheduler timezone: {err}"))?;
    let scheduler = SchedulerConfig::new(
        settings.scheduler.hour,
        settings.scheduler.minute,
        timezone,
    )?;

    let db = connect(&settings.database).await?;
    let engine = Arc::new(Engine::builder().database(db).build().await?);
    tracing::info!("ledger engine ready");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
        }
        tracing::info!("shutdown requested");
    };
    ledger::run_scheduler(engine, scheduler, shutdown).await;

    Ok(())
}

async fn connect(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let database = sea_orm::Database::connect(config.url()).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
