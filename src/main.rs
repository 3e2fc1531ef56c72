use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use quickpitch::app::event_gate::EventGate;
use quickpitch::config::{Config, DatabaseLocation};
use quickpitch::constants::{WEBHOOK_ID_HEADER, WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TIMESTAMP_HEADER};
use quickpitch::infra::sqlite_store::SqliteSubmissionStore;
use quickpitch::server::{start_server, AppState};
use quickpitch::{logging, metrics};

#[derive(Parser)]
#[command(name = "quickpitch")]
#[command(about = "Pitch submission pipeline: drafts, direct uploads, job dispatch and completion webhooks")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./quickpitch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the SQLite schema and exit
    Migrate,
    /// Print signed webhook headers for a body, for exercising the completion endpoint
    SignWebhook {
        /// Raw JSON body to sign
        #[arg(long)]
        body: String,
        /// Message id (random when omitted)
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.logging)?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(listen) = &config.metrics.listen {
                metrics::init_metrics(listen)?;
            }
            info!(
                env = ?config.app_env,
                storage = ?config.storage.backend,
                queue = ?config.queue.backend,
                verification = ?config.finalize.verification,
                "Starting quickpitch"
            );
            let state = AppState::from_config(&config).context("failed to wire adapters")?;
            start_server(state, &config.server).await?;
        }
        Commands::Migrate => match config.database.location() {
            DatabaseLocation::File(path) => {
                SqliteSubmissionStore::open(&path)
                    .with_context(|| format!("failed to migrate database at {path}"))?;
                println!("Database schema is up to date: {path}");
            }
            DatabaseLocation::Memory => {
                println!("In-memory database configured; nothing to migrate");
            }
        },
        Commands::SignWebhook { body, id } => {
            let gate = EventGate::new(config.webhook_secret()?, config.webhook.tolerance_secs)?;
            let id = id.unwrap_or_else(|| format!("msg_{}", Uuid::new_v4().simple()));
            let timestamp = Utc::now().timestamp();
            let signature = gate.sign(&id, timestamp, body.as_bytes())?;
            println!("{WEBHOOK_ID_HEADER}: {id}");
            println!("{WEBHOOK_TIMESTAMP_HEADER}: {timestamp}");
            println!("{WEBHOOK_SIGNATURE_HEADER}: {signature}");
        }
    }
    Ok(())
}
