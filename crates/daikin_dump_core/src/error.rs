use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Detailed authentication error information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    InvalidGrant,
    AccessDenied(String),
    StateMismatch,
    Unknown(String),
}

impl AuthError {
    /// Map an OAuth2 error response (`error`, `error_description`) to a typed error.
    pub fn from_oauth(code: &str, description: Option<&str>) -> Self {
        let description = description.unwrap_or(code);
        match code {
            "invalid_client" | "unauthorized_client" => {
                AuthError::AccessDenied(description.to_string())
            }
            "access_denied" => AuthError::AccessDenied(description.to_string()),
            "invalid_grant" => {
                let lower = description.to_lowercase();
                if lower.contains("password") || lower.contains("credentials") {
                    AuthError::InvalidCredentials
                } else {
                    AuthError::InvalidGrant
                }
            }
            _ => AuthError::Unknown(description.to_string()),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid email or password"),
            Self::InvalidGrant => write!(f, "authorization grant rejected or expired"),
            Self::AccessDenied(msg) => write!(f, "access denied: {}", msg),
            Self::StateMismatch => write!(f, "login state parameter mismatch"),
            Self::Unknown(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(AuthError),

    #[error("network error: {0}")]
    Network(String),

    #[error("proxy server error: {0}")]
    Proxy(String),

    #[error("invalid response from server: {0}")]
    InvalidServerResponse(String),

    #[error("failed to persist token set to {}: {reason}", .path.display())]
    TokenPersistence { path: PathBuf, reason: String },

    #[error("snapshot of device {device_id} failed: {reason}")]
    Snapshot { device_id: String, reason: String },

    #[error("no usable consumption data for device {device_id}: {reason}")]
    Consumption { device_id: String, reason: String },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
