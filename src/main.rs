use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gearguard::config::AppConfig;
use gearguard::db::Store;
use gearguard::server::{ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "gearguard")]
#[command(version, about = "Maintenance management API: equipment, teams, and repair requests")]
pub struct Cli {
    /// Path to the config file. Defaults to gearguard.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Permissive CORS for a local front-end dev server
        #[arg(long)]
        dev: bool,

        /// Refuse to move requests out of Repaired or Scrap
        #[arg(long)]
        strict_transitions: bool,
    },
    /// Create the database schema and exit
    InitDb {
        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gearguard=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            db,
            dev,
            strict_transitions,
        } => {
            let jwt_secret = AppConfig::jwt_secret()
                .context("JWT_SECRET is not set; refusing to start without a signing secret")?;
            let server_config = ServerConfig {
                host: host.unwrap_or(config.server.host),
                port: port.unwrap_or(config.server.port),
                db_path: db.unwrap_or(config.database.path),
                jwt_secret,
                token_ttl_days: config.auth.token_ttl_days,
                strict_transitions: strict_transitions || config.requests.strict_transitions,
                request_timeout_secs: config.server.request_timeout_secs,
                dev_mode: dev || config.server.dev_mode,
            };
            start_server(server_config).await
        }
        Commands::InitDb { db } => {
            let db_path = db.unwrap_or(config.database.path);
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            Store::new(&db_path)?;
            println!("Database initialized at {}", db_path.display());
            Ok(())
        }
    }
}
