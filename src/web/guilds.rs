//! Guild listing and per-guild module configuration routes
//!
//! Every route needs an active session. Guild routes additionally need the
//! session's user to hold ADMINISTRATOR on the guild; anything else is a 404
//! so the panel never confirms which guilds exist.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tower_cookies::Cookies;
use tracing::{debug, info};

use super::auth::require_session;
use super::server::AppState;
use crate::managers::{get_administered_guild, list_administered_guilds};
use crate::oauth::PartialGuild;
use crate::store::{ModuleConfigPatch, ModuleConfigRecord};

/// Guild summary returned to the dashboard
#[derive(Debug, Serialize)]
pub struct GuildSummary {
    pub id: String,
    pub name: String,
    pub icon_url: Option<String>,
    pub owner: bool,
}

impl From<PartialGuild> for GuildSummary {
    fn from(guild: PartialGuild) -> Self {
        Self {
            icon_url: guild.icon_url(),
            id: guild.id,
            name: guild.name,
            owner: guild.owner,
        }
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Session plus administrator check, shared by every per-guild route
async fn authorize_guild(
    state: &AppState,
    cookies: &Cookies,
    guild_id: &str,
) -> Result<PartialGuild, Response> {
    let session = require_session(state, cookies).await?;

    match get_administered_guild(state.guilds.as_ref(), &session.access_token, guild_id).await {
        Ok(Some(guild)) => Ok(guild),
        Ok(None) => {
            debug!("Guild {} is not administered by the session user", guild_id);
            Err(not_found("Guild not found"))
        }
        Err(e) => Err(e.into_response()),
    }
}

/// GET /api/servers - Guilds the user administers, by name
pub async fn list_servers(State(state): State<AppState>, cookies: Cookies) -> Response {
    let session = match require_session(&state, &cookies).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match list_administered_guilds(state.guilds.as_ref(), &session.access_token).await {
        Ok(guilds) => {
            let guilds: Vec<GuildSummary> = guilds.into_iter().map(GuildSummary::from).collect();
            Json(guilds).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// GET /api/servers/:guild_id
pub async fn get_server(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(guild_id): Path<String>,
) -> Response {
    match authorize_guild(&state, &cookies, &guild_id).await {
        Ok(guild) => Json(GuildSummary::from(guild)).into_response(),
        Err(response) => response,
    }
}

/// GET /api/servers/:guild_id/modules
pub async fn list_modules(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(guild_id): Path<String>,
) -> Response {
    if let Err(response) = authorize_guild(&state, &cookies, &guild_id).await {
        return response;
    }

    match state.module_configs.list_for_server(&guild_id) {
        Ok(records) => Json(records).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/servers/:guild_id/modules/:module_id
pub async fn get_module(
    State(state): State<AppState>,
    cookies: Cookies,
    Path((guild_id, module_id)): Path<(String, i64)>,
) -> Response {
    if let Err(response) = authorize_guild(&state, &cookies, &guild_id).await {
        return response;
    }

    match state.module_configs.get(&guild_id, module_id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found("Module not configured"),
        Err(e) => e.into_response(),
    }
}

/// PUT /api/servers/:guild_id/modules/:module_id - Update, or create with defaults
pub async fn put_module(
    State(state): State<AppState>,
    cookies: Cookies,
    Path((guild_id, module_id)): Path<(String, i64)>,
    Json(patch): Json<ModuleConfigPatch>,
) -> Response {
    if let Err(response) = authorize_guild(&state, &cookies, &guild_id).await {
        return response;
    }

    match upsert_module(&state, &guild_id, module_id, patch) {
        Ok((record, created)) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(record)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

fn upsert_module(
    state: &AppState,
    guild_id: &str,
    module_id: i64,
    patch: ModuleConfigPatch,
) -> crate::error::Result<(ModuleConfigRecord, bool)> {
    let repo = &state.module_configs;

    if let Some(existing) = repo.get(guild_id, module_id)? {
        if !repo.update(guild_id, module_id, &patch)? {
            return Ok((existing, false));
        }
        info!("Updated module {} on guild {}", module_id, guild_id);
        let updated = repo.get(guild_id, module_id)?.unwrap_or(existing);
        return Ok((updated, false));
    }

    let record = ModuleConfigRecord {
        server_id: guild_id.to_string(),
        module_id,
        enabled: patch.enabled.unwrap_or(true),
        module_config: patch
            .module_config
            .unwrap_or_else(|| serde_json::json!({})),
    };

    if repo.create(&record)? {
        info!("Created module {} on guild {}", module_id, guild_id);
        return Ok((record, true));
    }

    // Lost a race with a concurrent create; report what is stored now
    let stored = repo.get(guild_id, module_id)?.unwrap_or(record);
    Ok((stored, false))
}

/// DELETE /api/servers/:guild_id/modules/:module_id
pub async fn delete_module(
    State(state): State<AppState>,
    cookies: Cookies,
    Path((guild_id, module_id)): Path<(String, i64)>,
) -> Response {
    if let Err(response) = authorize_guild(&state, &cookies, &guild_id).await {
        return response;
    }

    match state.module_configs.delete(&guild_id, module_id) {
        Ok(true) => {
            info!("Deleted module {} on guild {}", module_id, guild_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found("Module not configured"),
        Err(e) => e.into_response(),
    }
}
