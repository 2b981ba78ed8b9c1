use serenity::model::permissions::Permissions;
use tracing::debug;

use crate::error::Result;
use crate::oauth::{GuildDirectory, PartialGuild};

/// Check the ADMINISTRATOR bit of a permission bitfield.
///
/// Discord sends the bitfield as a decimal string. A missing or unparseable
/// value counts as "not an administrator".
pub fn is_guild_administrator(permissions: Option<&str>) -> bool {
    permissions
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(|bits| Permissions::from_bits_truncate(bits).contains(Permissions::ADMINISTRATOR))
        .unwrap_or(false)
}

/// Sort guilds by name, then keep the ones the user administers
pub fn administered(mut guilds: Vec<PartialGuild>) -> Vec<PartialGuild> {
    guilds.sort_by(|a, b| a.name.cmp(&b.name));
    guilds.retain(|guild| is_guild_administrator(guild.permissions.as_deref()));
    guilds
}

/// Guilds the token's user administers, ordered by name
pub async fn list_administered_guilds(
    directory: &dyn GuildDirectory,
    access_token: &str,
) -> Result<Vec<PartialGuild>> {
    let guilds = directory.user_guilds(access_token).await?;
    let total = guilds.len();
    let guilds = administered(guilds);
    debug!("User administers {} of {} guilds", guilds.len(), total);
    Ok(guilds)
}

/// A single guild, only if the user is in it and administers it
pub async fn get_administered_guild(
    directory: &dyn GuildDirectory,
    access_token: &str,
    guild_id: &str,
) -> Result<Option<PartialGuild>> {
    let guild = directory
        .user_guilds(access_token)
        .await?
        .into_iter()
        .find(|guild| guild.id == guild_id);

    Ok(guild.filter(|guild| is_guild_administrator(guild.permissions.as_deref())))
}
