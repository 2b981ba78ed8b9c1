//! Session lifecycle: cookie resolution, expiry checks, refresh and issuance
//!
//! A missing cookie, or one that names no stored row, resolves to no session
//! at all. A stored session is in one of three states:
//!
//! - `Valid`: `expires` is further away than the refresh threshold
//! - `NearExpiry`: `expires` is in the future but within the threshold
//! - `Expired`: `now >= expires`
//!
//! The expiry check always runs before the threshold check, so a session
//! sitting exactly on its expiry instant is deleted, not refreshed.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tower_cookies::cookie::time::{Duration as CookieDuration, OffsetDateTime};
use tower_cookies::cookie::SameSite;
use tower_cookies::Cookie;
use tracing::{debug, info, warn};

use super::cookie_jar::CookieJar;
use crate::error::Result;
use crate::oauth::{TokenGrant, TokenIssuer};
use crate::store::{Session, SessionPatch, SessionRepository};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What to do with a session whose access token is already past expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiredSessionPolicy {
    /// Delete the row and report no session
    #[default]
    Delete,
    /// Try the refresh grant once; delete only if Discord rejects it
    AttemptRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Valid,
    NearExpiry,
    Expired,
}

/// Classify a stored session at `now`
pub fn classify(session: &Session, now: DateTime<Utc>, refresh_threshold: Duration) -> SessionState {
    if now >= session.expires {
        SessionState::Expired
    } else if session.expires - now <= refresh_threshold {
        SessionState::NearExpiry
    } else {
        SessionState::Valid
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub refresh_threshold: Duration,
    /// How long the browser keeps the cookie, independent of token expiry
    pub cookie_lifetime: Duration,
    pub expired_policy: ExpiredSessionPolicy,
    pub secure_cookie: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            refresh_threshold: Duration::hours(24),
            cookie_lifetime: Duration::days(365),
            expired_policy: ExpiredSessionPolicy::Delete,
            secure_cookie: false,
        }
    }
}

pub struct SessionManager {
    sessions: SessionRepository,
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

pub type SharedSessionManager = Arc<SessionManager>;

impl SessionManager {
    pub fn new(
        sessions: SessionRepository,
        issuer: Arc<dyn TokenIssuer>,
        settings: SessionSettings,
    ) -> Self {
        Self::with_clock(sessions, issuer, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        sessions: SessionRepository,
        issuer: Arc<dyn TokenIssuer>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            issuer,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Bearer value from the session cookie. Empty values count as absent.
    fn bearer(&self, cookies: &dyn CookieJar) -> Option<String> {
        cookies
            .value(&self.settings.cookie_name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Resolve the cookie to a live session, refreshing it if it is close to expiry.
    ///
    /// Returns `Ok(None)` for a missing or dangling cookie and for an expired
    /// session (which is deleted on the way). Provider and storage errors propagate.
    pub async fn resolve_active_session(&self, cookies: &dyn CookieJar) -> Result<Option<Session>> {
        let Some(id) = self.bearer(cookies) else {
            return Ok(None);
        };

        let Some(session) = self.sessions.get(&id)? else {
            debug!("Session cookie references no stored session");
            return Ok(None);
        };

        let now = self.clock.now();
        match classify(&session, now, self.settings.refresh_threshold) {
            SessionState::Expired => self.handle_expired(session).await,
            SessionState::NearExpiry => {
                debug!("Session expires at {}, refreshing", session.expires);
                Ok(Some(self.refresh(&session).await?))
            }
            SessionState::Valid => Ok(Some(session)),
        }
    }

    async fn handle_expired(&self, session: Session) -> Result<Option<Session>> {
        match self.settings.expired_policy {
            ExpiredSessionPolicy::Delete => {
                info!("Session expired at {}, deleting", session.expires);
                self.sessions.delete(&session.id)?;
                Ok(None)
            }
            ExpiredSessionPolicy::AttemptRefresh => match self.refresh(&session).await {
                Ok(refreshed) => Ok(Some(refreshed)),
                Err(e) if e.is_grant_rejection() => {
                    warn!("Refresh of expired session rejected, deleting: {}", e);
                    self.sessions.delete(&session.id)?;
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Run the refresh grant and store the rotated tokens under the same id.
    ///
    /// A failed refresh leaves the stored row untouched.
    pub async fn refresh(&self, session: &Session) -> Result<Session> {
        let grant = self.issuer.refresh(&session.refresh_token).await?;
        let expires = grant.expires_at(self.clock.now())?;

        let refreshed = Session {
            id: session.id.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires,
        };

        self.sessions.update(
            &refreshed.id,
            &SessionPatch::tokens(
                refreshed.access_token.clone(),
                refreshed.refresh_token.clone(),
                refreshed.expires,
            ),
        )?;

        info!("Session refreshed, now expires at {}", refreshed.expires);
        Ok(refreshed)
    }

    /// Persist a session for a fresh token grant and set the bearer cookie
    pub async fn issue_session(&self, cookies: &dyn CookieJar, grant: TokenGrant) -> Result<Session> {
        let now = self.clock.now();
        let session = self.sessions.insert(
            &grant.access_token,
            &grant.refresh_token,
            grant.expires_at(now)?,
        )?;

        cookies.add(self.session_cookie(&session.id, now));
        info!("Issued new session expiring at {}", session.expires);
        Ok(session)
    }

    /// Log out: drop the stored session (if any) and clear the cookie
    pub async fn end_session(&self, cookies: &dyn CookieJar) -> Result<()> {
        if let Some(id) = self.bearer(cookies) {
            self.sessions.delete(&id)?;
            debug!("Session deleted on logout");
        }

        let mut removal = Cookie::new(self.settings.cookie_name.clone(), "");
        removal.set_path("/");
        cookies.remove(removal);
        Ok(())
    }

    fn session_cookie(&self, id: &str, now: DateTime<Utc>) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.settings.cookie_name.clone(), id.to_string());
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Strict);
        cookie.set_secure(self.settings.secure_cookie);

        let lifetime_secs = self.settings.cookie_lifetime.num_seconds();
        cookie.set_max_age(CookieDuration::seconds(lifetime_secs));
        let expires = OffsetDateTime::from_unix_timestamp(now.timestamp())
            .ok()
            .and_then(|issued| issued.checked_add(CookieDuration::seconds(lifetime_secs)));
        if let Some(expires) = expires {
            cookie.set_expires(expires);
        }
        cookie
    }
}
