use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    // Storage errors
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: rusqlite::Error,
    },

    #[error("Corrupt value in {table}.{column}: {message}")]
    CorruptRecord {
        table: &'static str,
        column: &'static str,
        message: String,
    },

    #[error("Failed to serialize module config: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    // Provider errors
    #[error("Token endpoint rejected {grant} grant ({status}): {body}")]
    TokenRejected {
        grant: &'static str,
        status: u16,
        body: String,
    },

    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Configuration errors
    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PanelError {
    /// True when the failure came from the OAuth provider rather than local state
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            PanelError::TokenRejected { .. } | PanelError::Discord { .. }
        )
    }

    /// True only when Discord answered and refused the grant. Transport
    /// failures do not count.
    pub fn is_grant_rejection(&self) -> bool {
        matches!(self, PanelError::TokenRejected { .. })
    }
}

impl From<reqwest::Error> for PanelError {
    fn from(err: reqwest::Error) -> Self {
        PanelError::Discord {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        let rejected = PanelError::TokenRejected {
            grant: "refresh_token",
            status: 400,
            body: "invalid_grant".to_string(),
        };
        assert!(rejected.is_provider_error());
        assert!(rejected.is_grant_rejection());

        let timeout = PanelError::Discord {
            message: "connection timed out".to_string(),
        };
        assert!(timeout.is_provider_error());
        assert!(!timeout.is_grant_rejection());

        let storage = PanelError::from(rusqlite::Error::InvalidQuery);
        assert!(!storage.is_provider_error());
        assert!(storage.to_string().starts_with("Storage error"));
    }
}
