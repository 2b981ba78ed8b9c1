use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod config;
mod error;
mod logging;
mod managers;
mod oauth;
mod store;
mod web;

use config::PanelConfig;
use managers::SessionManager;
use oauth::DiscordOAuth;
use store::RecordStore;

/// Dashboard backend for managing Discord guild modules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file, overrides DATABASE_PATH
    #[arg(long, short = 'd')]
    database: Option<PathBuf>,

    /// Listen port, overrides WEB_PORT
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Issue a bot API token with this label, print it and exit
    #[arg(long, value_name = "LABEL")]
    issue_api_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    logging::init();

    let mut config = PanelConfig::from_env()?;
    if let Some(path) = args.database {
        config.database_path = path;
    }

    let mut web_config = web::WebServerConfig::from_env();
    if let Some(port) = args.port {
        web_config.port = port;
    }

    info!("Opening database at {}", config.database_path.display());
    let store = RecordStore::open(&config.database_path)?;

    if let Some(label) = args.issue_api_token {
        let token = store.api_tokens().issue(&label)?;
        println!("{}", token);
        store.close()?;
        return Ok(());
    }

    let discord = Arc::new(DiscordOAuth::new(&config));
    let sessions = Arc::new(SessionManager::new(
        store.sessions(),
        discord.clone(),
        config.session_settings()?,
    ));

    let state = web::AppState {
        sessions,
        issuer: discord.clone(),
        guilds: discord.clone(),
        module_configs: store.module_configs(),
        api_tokens: store.api_tokens(),
        logs: store.logs(),
        authorize_url: discord.authorize_url(),
    };
    drop(discord);

    web::start_web_server(web_config, state).await?;

    if let Err(e) = store.close() {
        warn!("Failed to close database cleanly: {}", e);
    }
    info!("Panel stopped");

    Ok(())
}
