//! Web server setup, shared state and error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::api::create_log;
use super::auth::{logout, oauth};
use super::guilds::{
    delete_module, get_module, get_server, list_modules, list_servers, put_module,
};
use crate::error::PanelError;
use crate::managers::SharedSessionManager;
use crate::oauth::{GuildDirectory, TokenIssuer};
use crate::store::{ApiTokenRepository, LogRepository, ModuleConfigRepository};

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub port: u16,
    /// Certificate PEM (cert + CA bundle). HTTPS is served only when both paths are set.
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cert_path: None,
            key_path: None,
        }
    }
}

impl WebServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("WEB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            cert_path: std::env::var("TLS_CERT_PATH").ok().map(PathBuf::from),
            key_path: std::env::var("TLS_KEY_PATH").ok().map(PathBuf::from),
        }
    }

    fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.cert_path.as_ref().zip(self.key_path.as_ref())
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SharedSessionManager,
    pub issuer: Arc<dyn TokenIssuer>,
    pub guilds: Arc<dyn GuildDirectory>,
    pub module_configs: ModuleConfigRepository,
    pub api_tokens: ApiTokenRepository,
    pub logs: LogRepository,
    /// Discord consent screen for the login route
    pub authorize_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/oauth", get(oauth))
        .route("/api/logout", post(logout))
        .route("/api/servers", get(list_servers))
        .route("/api/servers/:guild_id", get(get_server))
        .route("/api/servers/:guild_id/modules", get(list_modules))
        .route(
            "/api/servers/:guild_id/modules/:module_id",
            get(get_module).put(put_module).delete(delete_module),
        )
        .route("/api/v1/logs", post(create_log))
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Serve until ctrl-c. Uses HTTPS when certificate paths are configured.
pub async fn start_web_server(config: WebServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            info!("Loading TLS certificates:");
            info!("  Certificate: {}", cert_path.display());
            info!("  Private key: {}", key_path.display());

            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                        e,
                        cert_path.display(),
                        key_path.display()
                    )
                })?;

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(Duration::from_secs(10)));
            });

            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
}

/// Health check endpoint
async fn health() -> &'static str {
    "Guild panel running"
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        if self.is_provider_error() {
            // Discord refused us or is unreachable; send the user somewhere safe
            warn!("Provider error: {}", self);
            return Redirect::to("/").into_response();
        }

        error!("Request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Internal server error" })),
        )
            .into_response()
    }
}
