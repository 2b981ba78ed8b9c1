//! Discord login, callback and logout routes
//!
//! `/api/oauth` doubles as login entry and OAuth callback: without a `code`
//! it redirects to Discord's consent screen, with one it exchanges the code
//! and issues a session cookie.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_cookies::Cookies;
use tracing::{info, warn};

use super::server::AppState;
use crate::store::Session;

/// Where the browser lands after a successful login
pub const POST_LOGIN_REDIRECT: &str = "/servers";

/// Query parameters of the login/callback route
#[derive(Debug, Deserialize)]
pub struct OAuthParams {
    pub code: Option<String>,
    /// Set by Discord when the user denies consent
    pub error: Option<String>,
}

/// Resolve the request's session, or produce the redirect to log in
pub async fn require_session(state: &AppState, cookies: &Cookies) -> Result<Session, Response> {
    match state.sessions.resolve_active_session(cookies).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(Redirect::to("/api/oauth").into_response()),
        Err(e) => Err(e.into_response()),
    }
}

/// GET /api/oauth - Start login, or finish it when Discord calls back with a code
pub async fn oauth(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<OAuthParams>,
) -> Response {
    if let Some(error) = params.error {
        warn!("Discord returned OAuth error: {}", error);
        return Redirect::to("/").into_response();
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Redirect::to(&state.authorize_url).into_response();
    };

    let grant = match state.issuer.exchange_code(&code).await {
        Ok(grant) => grant,
        Err(e) => return e.into_response(),
    };

    match state.sessions.issue_session(&cookies, grant).await {
        Ok(_) => {
            info!("Login completed");
            Redirect::to(POST_LOGIN_REDIRECT).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// POST /api/logout - Drop the session and clear the cookie
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    match state.sessions.end_session(&cookies).await {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => e.into_response(),
    }
}
