mod config_commands;
mod db_commands;
mod run;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    lorebot_config::LorebotConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "lorebot", about = "lorebot: a lore-keeping Telegram bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery in ./ and ~/.config/lorebot/).
    #[arg(long, global = true, env = "LOREBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory holding the default SQLite database.
    #[arg(long, global = true, env = "LOREBOT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured bot account (default when no subcommand is given).
    Run {
        /// Keep everything in memory; nothing survives a restart.
        #[arg(long)]
        ephemeral: bool,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Run database migrations and exit.
    Migrate,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// An explicit `--config` must load; discovery falls back to defaults.
fn load_config(cli: &Cli) -> anyhow::Result<LorebotConfig> {
    match &cli.config {
        Some(path) => lorebot_config::load_config(path),
        None => Ok(lorebot_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "lorebot starting");

    let config = load_config(&cli)?;
    let data_dir = lorebot_config::data_dir(cli.data_dir.as_deref());

    match cli.command {
        None => run::run(config, data_dir, false).await,
        Some(Commands::Run { ephemeral }) => run::run(config, data_dir, ephemeral).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, &config),
        Some(Commands::Migrate) => db_commands::migrate(&config, &data_dir).await,
    }
}
