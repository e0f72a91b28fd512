use std::path::Path;

use {lorebot_config::LorebotConfig, tracing::info};

/// Create the database if needed and apply pending migrations.
pub async fn migrate(config: &LorebotConfig, data_dir: &Path) -> anyhow::Result<()> {
    let url = database_url(config, data_dir)?;
    let pool = lorebot_store::connect(&url).await?;
    lorebot_store::run_migrations(&pool).await?;
    pool.close().await;
    info!(url, "database migrations applied");
    println!("Migrations applied.");
    Ok(())
}

/// Database URL, creating the data directory for the default location.
pub fn database_url(config: &LorebotConfig, data_dir: &Path) -> anyhow::Result<String> {
    if config.storage.database_url.is_none() {
        std::fs::create_dir_all(data_dir)?;
    }
    Ok(config.storage.resolve_url(data_dir))
}
