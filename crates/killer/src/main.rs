//! chess-killer
//!
//! Reads a PGN file, attributes every capture to the piece that made it and
//! writes the kill matrix and death timeline, checkpointing along the way.

use clap::Parser;
use tracing::info;

use killer::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local runs
    let _ = dotenvy::dotenv();

    let config = Cli::parse().into_config()?;
    info!(
        pgn = %config.pgn_path.display(),
        output_dir = %config.output_dir.display(),
        mode = ?config.mode,
        workers = config.workers,
        "Config loaded"
    );

    std::fs::create_dir_all(&config.output_dir)?;
    let summary = killer::run(&config).await?;

    info!(
        games = summary.games_processed(),
        kills = summary.stats.total_kills(),
        "Done"
    );
    Ok(())
}
