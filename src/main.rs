//! Hostel management API server.
//!
//! # Configuration
//!
//! Environment variables (override the config file):
//! - `HOSTELMGR_PORT`: Port to listen on (default: 8080)
//! - `HOSTELMGR_DATABASE_PATH`: SQLite database file
//! - `HOSTELMGR_TOKENS_PATH`: Path to the tokens YAML file
//!
//! # Tokens File Format
//!
//! ```yaml
//! tokens:
//!   - token: "your-secret-token"
//!     user_id: "3b2e..."
//!     role: "admin"
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hostelmgr::config::Config;
use hostelmgr::db::{init_db, RoomRepository};
use hostelmgr::server::{app, AppState, TokenStore};

#[derive(Parser)]
#[command(name = "hostelmgr")]
#[command(version)]
#[command(about = "Hostel management API server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostelmgr=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    let port = cli.port.unwrap_or(config.port);

    let pool = match init_db(Some(config.database_path.clone())).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // Make sure the configured layout exists before serving requests
    let rooms = RoomRepository::new(pool.clone());
    match rooms.seed(&config.rooms).await {
        Ok(created) if created > 0 => {
            tracing::info!("Seeded {} room(s) from the configured layout", created);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Failed to seed rooms: {}", e);
            std::process::exit(1);
        }
    }

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Tokens file: {}", config.tokens_path.display());

    let tokens = Arc::new(TokenStore::load(&config.tokens_path));
    let state = AppState {
        pool,
        tokens,
        layout: Arc::new(config.rooms),
    };

    let router = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
