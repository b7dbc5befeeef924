//! Error types for tokenkeeper

use thiserror::Error;

/// Result type alias for tokenkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Transport-level errors returned by the authentication API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required or credentials rejected")]
    Unauthorized,

    #[error("{0}")]
    GraphQl(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to API".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Malformed access token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token is not a three-part compact token")]
    Malformed,

    #[error("Token payload is not valid base64url: {0}")]
    Encoding(String),

    #[error("Token payload is not a valid claim set: {0}")]
    Claims(String),
}

/// Durable storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Failed to encode stored value: {0}")]
    Encode(String),
}

/// Session lifecycle errors surfaced to callers
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Login failed: {0}")]
    Authentication(ApiError),

    #[error("Session refresh failed: {0}")]
    Refresh(ApiError),

    #[error("{0}")]
    Registration(ApiError),

    #[error("Received an unreadable access token: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to persist session: {0}")]
    Storage(#[from] StorageError),

    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("No refresh token available")]
    NoRefreshToken,
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
