//! model_sync CLI
//!
//! Synchronizes the configured declaration sources against the database once.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use model_sync::utils::logging::init_logging;
use model_sync::ModelSyncClient;

/// Keep database tables in line with column declarations.
#[derive(Parser)]
#[command(name = "model_sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "model_sync.toml")]
    config: PathBuf,

    /// Database URL, overrides `database.url` from the configuration.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Plan and report the changes without executing them.
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = model_sync::config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.dry_run {
        config.sync.dry_run = true;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;

    let client = ModelSyncClient::new(config)
        .await
        .context("Failed to connect to the database")?;

    let report = client.sync_database().await;
    client.close().await;
    let report = report?;

    tracing::info!(
        run_id = %report.run_id,
        actions = report.actions.len(),
        tables_created = report.tables_created.len(),
        skipped_sources = report.skipped_sources.len(),
        skipped_declarations = report.skipped_declarations.len(),
        skipped_operations = report.skipped_operations.len(),
        "End."
    );

    Ok(())
}
