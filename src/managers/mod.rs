pub mod cookie_jar;
pub mod permission_checker;
pub mod session_manager;

pub use permission_checker::{get_administered_guild, list_administered_guilds};
pub use session_manager::{
    ExpiredSessionPolicy, SessionManager, SessionSettings, SharedSessionManager,
};
