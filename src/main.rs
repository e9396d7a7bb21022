use chrono::Utc;
use dotenvy::dotenv;
use necessity_ledger::{
    config::{database, settings},
    core::{contribution, necessity, report},
    errors::Result,
};
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();

    // 3. Load settings
    let config_path =
        env::var("NECESSITY_LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings = settings::load_settings_or_default(&config_path)
        .inspect_err(|e| error!("Failed to load settings from {config_path}: {e}"))?;

    // 4. Connect and make sure the schema exists
    if env::var("DATABASE_URL").is_err() {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db).await?;

    // 5. Seed configured necessities
    necessity::seed_necessities(&db, &settings.necessities).await?;

    // 6. Expire accepted contributions that were never delivered
    let expired = contribution::expire_stale_contributions(
        &db,
        Utc::now(),
        settings.allocation.delivery_window_days,
    )
    .await?;
    if !expired.is_empty() {
        info!("Expired {} contributions past their delivery window", expired.len());
    }

    // 7. Progress overview
    for item in necessity::get_all_necessities(&db).await? {
        let progress = report::generate_necessity_report(&db, item.id).await?;
        info!("{}", report::format_necessity_report(&progress));
    }

    let unassigned = contribution::get_unassigned_contributions(&db).await?;
    if !unassigned.is_empty() {
        info!(
            "{} pending contributions have no necessity and need triage",
            unassigned.len()
        );
    }

    Ok(())
}
