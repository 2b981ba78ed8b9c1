//! HTTP surface of the panel
//!
//! Login through Discord OAuth, then JSON routes for the guilds the user
//! administers and their module configuration. The bot reports command
//! logs through a separate token-authenticated API.

mod api;
mod auth;
mod guilds;
mod server;

pub use server::{start_web_server, AppState, WebServerConfig};
