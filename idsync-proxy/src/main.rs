//! idsync - identity sync proxy tools
//!
//! `classify` reports how each entry of an LDIF file would be registered.
//! `history` prints the recorded state transitions of a registration or
//! membership.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idsync_common::config::{default_database_path, resolve_config_path, ProxyConfig};
use idsync_common::db::init_database;
use idsync_common::{classify, parse_ldif};
use idsync_proxy::db::touch_history;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for idsync
#[derive(Parser, Debug)]
#[command(name = "idsync")]
#[command(about = "Identity synchronization proxy tools")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true, env = "IDSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the registration kind of every entry in an LDIF file
    Classify {
        /// LDIF file, entries separated by blank lines
        file: PathBuf,
    },
    /// Print the touch history of a registration or membership
    History {
        /// Registration or membership guid
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let level = config
        .as_ref()
        .map(|config| config.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    debug!(?args, "Parsed arguments");

    match &args.command {
        Command::Classify { file } => classify_file(file),
        Command::History { id } => {
            let db_path = args
                .database
                .clone()
                .or_else(|| config.as_ref().map(ProxyConfig::database_path))
                .unwrap_or_else(default_database_path);
            print_history(&db_path, *id).await
        }
    }
}

/// Configuration if a file can be found; a file that fails to load is an error
fn load_config(cli_arg: Option<&Path>) -> Result<Option<ProxyConfig>> {
    let Ok(path) = resolve_config_path(cli_arg) else {
        return Ok(None);
    };
    let config = ProxyConfig::load(&path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    Ok(Some(config))
}

fn classify_file(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let records = parse_ldif(&text);
    info!("Classifying {} entries from {}", records.len(), file.display());
    for record in &records {
        println!("{}\t{}", record.first("dn").unwrap_or("-"), classify(record));
    }
    Ok(())
}

async fn print_history(db_path: &Path, id: Uuid) -> Result<()> {
    info!("Database path: {}", db_path.display());
    let pool = init_database(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let touches = touch_history(&pool, id)
        .await
        .context("Failed to load touch history")?;
    if touches.is_empty() {
        info!("No touches recorded for {}", id);
    }
    for touch in touches {
        println!(
            "{}\t{}\t{}\t{}",
            touch.touched_at.to_rfc3339(),
            touch.artifact.kind(),
            touch.state,
            touch.actor
        );
    }
    Ok(())
}
