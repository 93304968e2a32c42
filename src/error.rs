//! Unified error type for the dashboard client.
//!
//! `AppError` is returned by every API call, push decoder, and operator command.
//! It serializes as `{ "kind": "...", "message": "..." }` so front ends can
//! distinguish error categories without string matching.

use serde::ser::SerializeStruct;

/// Application-level error.
///
/// A superseded optimistic action is not an error; see
/// [`RollbackOutcome`](crate::core::store::RollbackOutcome).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The server or push channel could not be reached (connect, timeout, reset).
    #[error("{0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("server rejected request with status {status}")]
    ServerRejection { status: u16 },

    /// A payload failed to decode or failed boundary validation.
    #[error("{0}")]
    Parse(String),

    /// Operator input rejected before anything was sent.
    #[error("{0}")]
    InvalidInput(String),

    /// The push transport failed or was closed.
    #[error("{0}")]
    Channel(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Network(_) => "Network",
            AppError::ServerRejection { .. } => "ServerRejection",
            AppError::Parse(_) => "Parse",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Channel(_) => "Channel",
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            AppError::ServerRejection {
                status: status.as_u16(),
            }
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Channel(err.to_string())
    }
}
