use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wpsync::app::{AppContext, SyncError};
use wpsync::cli::{commands, Cli, Commands};
use wpsync::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        commands::show_config_path()?;
        return Ok(());
    }

    let mut config = Config::load().map_err(|e| SyncError::Config(e.to_string()))?;
    cli.server.apply(&mut config.server);
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Sync { json } => {
            commands::sync_posts(&ctx, json).await?;
        }
        Commands::Page { number } => {
            commands::show_page(&ctx, number).await?;
        }
        Commands::Config => {}
    }

    Ok(())
}
