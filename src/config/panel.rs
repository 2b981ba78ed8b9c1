use chrono::Duration;
use std::path::PathBuf;

use crate::error::{PanelError, Result};
use crate::managers::{ExpiredSessionPolicy, SessionSettings};

/// Dashboard configuration, read from the environment
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Public base URL; the OAuth redirect is `<base_url>/api/oauth`
    pub base_url: String,

    /// SQLite database file
    pub database_path: PathBuf,

    pub cookie_name: String,
    pub refresh_threshold_secs: i64,
    pub cookie_lifetime_days: i64,
    pub expired_policy: ExpiredSessionPolicy,

    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}

impl PanelConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process env
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| PanelError::ConfigValidation {
                message: format!("{} must be set", key),
            })
        };

        let parse_i64 = |key: &str, default: i64| -> Result<i64> {
            match lookup(key) {
                Some(raw) => raw.trim().parse().map_err(|_| PanelError::ConfigValidation {
                    message: format!("{} must be an integer, got {:?}", key, raw),
                }),
                None => Ok(default),
            }
        };

        let expired_policy = match lookup("EXPIRED_SESSION_POLICY").as_deref() {
            None | Some("delete") => ExpiredSessionPolicy::Delete,
            Some("refresh") => ExpiredSessionPolicy::AttemptRefresh,
            Some(other) => {
                return Err(PanelError::ConfigValidation {
                    message: format!(
                        "EXPIRED_SESSION_POLICY must be 'delete' or 'refresh', got {:?}",
                        other
                    ),
                })
            }
        };

        let config = Self {
            client_id: required("DISCORD_CLIENT_ID")?,
            client_secret: required("DISCORD_CLIENT_SECRET")?,
            base_url: lookup("WEB_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/panel.db")),
            cookie_name: lookup("SESSION_COOKIE_NAME").unwrap_or_else(|| "session".to_string()),
            refresh_threshold_secs: parse_i64("SESSION_REFRESH_THRESHOLD_SECS", 86400)?,
            cookie_lifetime_days: parse_i64("SESSION_COOKIE_DAYS", 365)?,
            expired_policy,
            secure_cookies: lookup("SECURE_COOKIES")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cookie_name.is_empty() || self.cookie_name.contains([';', '=', ' ']) {
            return Err(PanelError::ConfigValidation {
                message: format!("invalid cookie name {:?}", self.cookie_name),
            });
        }
        if self.refresh_threshold_secs < 0 {
            return Err(PanelError::ConfigValidation {
                message: "SESSION_REFRESH_THRESHOLD_SECS must not be negative".to_string(),
            });
        }
        if self.cookie_lifetime_days <= 0 {
            return Err(PanelError::ConfigValidation {
                message: "SESSION_COOKIE_DAYS must be positive".to_string(),
            });
        }
        self.session_settings()?;
        Ok(())
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/api/oauth", self.base_url)
    }

    pub fn session_settings(&self) -> Result<SessionSettings> {
        let refresh_threshold = Duration::try_seconds(self.refresh_threshold_secs).ok_or_else(|| {
            PanelError::ConfigValidation {
                message: "SESSION_REFRESH_THRESHOLD_SECS is out of range".to_string(),
            }
        })?;
        let cookie_lifetime = Duration::try_days(self.cookie_lifetime_days).ok_or_else(|| {
            PanelError::ConfigValidation {
                message: "SESSION_COOKIE_DAYS is out of range".to_string(),
            }
        })?;

        Ok(SessionSettings {
            cookie_name: self.cookie_name.clone(),
            refresh_threshold,
            cookie_lifetime,
            expired_policy: self.expired_policy,
            secure_cookie: self.secure_cookies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PanelConfig::from_lookup(lookup(&[
            ("DISCORD_CLIENT_ID", "id"),
            ("DISCORD_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.redirect_uri(), "http://localhost:3000/api/oauth");
        assert_eq!(config.database_path, PathBuf::from("data/panel.db"));

        let settings = config.session_settings().unwrap();
        assert_eq!(settings.cookie_name, "session");
        assert_eq!(settings.refresh_threshold, Duration::hours(24));
        assert_eq!(settings.cookie_lifetime, Duration::days(365));
        assert_eq!(settings.expired_policy, ExpiredSessionPolicy::Delete);
        assert!(!settings.secure_cookie);
    }

    #[test]
    fn test_overrides() {
        let config = PanelConfig::from_lookup(lookup(&[
            ("DISCORD_CLIENT_ID", "id"),
            ("DISCORD_CLIENT_SECRET", "secret"),
            ("WEB_BASE_URL", "https://panel.example.com/"),
            ("SESSION_COOKIE_NAME", "sid"),
            ("SESSION_REFRESH_THRESHOLD_SECS", "3600"),
            ("EXPIRED_SESSION_POLICY", "refresh"),
            ("SECURE_COOKIES", "true"),
        ]))
        .unwrap();

        assert_eq!(config.redirect_uri(), "https://panel.example.com/api/oauth");
        let settings = config.session_settings().unwrap();
        assert_eq!(settings.cookie_name, "sid");
        assert_eq!(settings.refresh_threshold, Duration::hours(1));
        assert_eq!(settings.expired_policy, ExpiredSessionPolicy::AttemptRefresh);
        assert!(settings.secure_cookie);
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert!(matches!(
            PanelConfig::from_lookup(lookup(&[("DISCORD_CLIENT_ID", "id")])),
            Err(PanelError::ConfigValidation { .. })
        ));

        assert!(PanelConfig::from_lookup(lookup(&[
            ("DISCORD_CLIENT_ID", "id"),
            ("DISCORD_CLIENT_SECRET", "secret"),
            ("SESSION_REFRESH_THRESHOLD_SECS", "soon"),
        ]))
        .is_err());

        assert!(PanelConfig::from_lookup(lookup(&[
            ("DISCORD_CLIENT_ID", "id"),
            ("DISCORD_CLIENT_SECRET", "secret"),
            ("EXPIRED_SESSION_POLICY", "ignore"),
        ]))
        .is_err());
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        assert!(matches!(
            PanelConfig::from_lookup(lookup(&[
                ("DISCORD_CLIENT_ID", "id"),
                ("DISCORD_CLIENT_SECRET", "secret"),
                ("SESSION_COOKIE_DAYS", "99999999999999"),
            ])),
            Err(PanelError::ConfigValidation { .. })
        ));

        assert!(matches!(
            PanelConfig::from_lookup(lookup(&[
                ("DISCORD_CLIENT_ID", "id"),
                ("DISCORD_CLIENT_SECRET", "secret"),
                ("SESSION_REFRESH_THRESHOLD_SECS", "9223372036854775807"),
            ])),
            Err(PanelError::ConfigValidation { .. })
        ));
    }
}
