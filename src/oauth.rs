//! OAuth state and Discord API interactions

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::PanelConfig;
use crate::error::{PanelError, Result};

pub const DISCORD_API_BASE: &str = "https://discord.com/api";
pub const DISCORD_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// Scopes requested by the authorization-code grant
pub const OAUTH_SCOPES: &str = "identify guilds";

/// Discord OAuth token response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of `access_token` in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Absolute expiry of the access token if it was issued at `now`.
    ///
    /// A lifetime too large to represent is reported as a provider error.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| PanelError::Discord {
                message: format!("token lifetime out of range: {}s", self.expires_in),
            })
    }
}

/// Guild entry from /users/@me/guilds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialGuild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner: bool,
    /// Permission bitfield as a decimal string
    #[serde(default)]
    pub permissions: Option<String>,
}

impl PartialGuild {
    pub fn icon_url(&self) -> Option<String> {
        self.icon
            .as_ref()
            .map(|hash| format!("https://cdn.discordapp.com/icons/{}/{}", self.id, hash))
    }
}

/// The provider's token endpoint
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Authorization-code grant
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Refresh-token grant
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Guilds visible to an access token
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    async fn user_guilds(&self, access_token: &str) -> Result<Vec<PartialGuild>>;
}

/// OAuth client for Discord
#[derive(Clone)]
pub struct DiscordOAuth {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base: String,
    pub http_client: reqwest::Client,
}

impl DiscordOAuth {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri(),
            api_base: DISCORD_API_BASE.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Consent screen URL the login route redirects to
    pub fn authorize_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
            DISCORD_AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(OAUTH_SCOPES)
        )
    }

    async fn token_request(&self, grant: &'static str, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http_client
            .post(format!("{}/oauth2/token", self.api_base))
            .form(form)
            .send()
            .await
            .map_err(|e| {
                error!("Token request ({}) failed: {}", grant, e);
                PanelError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token endpoint rejected {} grant: {} {}", grant, status, body);
            return Err(PanelError::TokenRejected {
                grant,
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenGrant = response.json().await?;
        debug!("Received {} grant, expires in {}s", grant, token.expires_in);
        Ok(token)
    }
}

#[async_trait]
impl TokenIssuer for DiscordOAuth {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        self.token_request(
            "authorization_code",
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", OAUTH_SCOPES),
            ],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(
            "refresh_token",
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }
}

#[async_trait]
impl GuildDirectory for DiscordOAuth {
    async fn user_guilds(&self, access_token: &str) -> Result<Vec<PartialGuild>> {
        let response = self
            .http_client
            .get(format!("{}/users/@me/guilds", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Guild list request failed: {} {}", status, body);
            return Err(PanelError::Discord {
                message: format!("guild list request failed with {}", status),
            });
        }

        Ok(response.json().await?)
    }
}
