use reqwest::StatusCode;
use thiserror::Error;

/// Error string the poll loop matches on to trigger a re-login.
pub const TOKEN_EXPIRED: &str = "Token expired";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Login failed: {status}: {body}")]
    Auth { status: StatusCode, body: String },

    #[error("Login failed: response did not contain a token")]
    MissingToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Error retrieving telemetry data: {status}: {body}")]
    Request { status: StatusCode, body: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid time format. Expected DD-MM-YYYY HH:MM:SS, got {0}")]
    InvalidTimeFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by the failure, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Auth { status, .. } | Error::Request { status, .. } => Some(status.as_u16()),
            Error::TokenExpired => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Errors that retrying cannot fix. The poll loop stops on these.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidTimeFormat(_) => true,
            Error::Config(_) => true,

            Error::Auth { .. } => false,
            Error::MissingToken => false,
            Error::TokenExpired => false,
            Error::Request { .. } => false,
            Error::Transport(_) => false,
            Error::Json(_) => false,
        }
    }

    /// Short label used for the fetch failure metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Auth { .. } | Error::MissingToken => "auth",
            Error::TokenExpired => "token_expired",
            Error::Request { .. } => "request",
            Error::Transport(_) => "transport",
            Error::Json(_) => "json",
            Error::InvalidTimeFormat(_) => "invalid_time",
            Error::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
