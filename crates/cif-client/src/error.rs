//! Client error types.
//!
//! Every failure is scoped to one call. Only [`ClientError::Transient`]
//! is worth retrying, and only by user action.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server rejected the input (bad type, too large, empty text).
    #[error("{endpoint} rejected: {message}")]
    Validation { endpoint: String, message: String },
    /// Missing or invalid admin credential or CSRF token.
    #[error("{endpoint} not authorized ({status}): {message}")]
    Auth {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("{endpoint}: not found")]
    NotFound { endpoint: String },
    /// Network failure (`status` is `None`) or server-side error.
    #[error("{endpoint} failed transiently: {message}")]
    Transient {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },
    /// Any other non-2xx response.
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode response from {endpoint}: {message}")]
    Deserialization { endpoint: String, message: String },
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn server_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

impl ClientError {
    /// Classify a non-2xx response.
    pub fn from_status(endpoint: impl Into<String>, status: u16, body: String) -> Self {
        let endpoint = endpoint.into();
        match status {
            413 | 415 | 422 => Self::Validation {
                endpoint,
                message: server_message(&body),
            },
            401 | 403 => Self::Auth {
                endpoint,
                status,
                message: server_message(&body),
            },
            404 => Self::NotFound { endpoint },
            408 | 429 | 500..=599 => Self::Transient {
                endpoint,
                status: Some(status),
                message: server_message(&body),
            },
            _ => Self::Api {
                endpoint,
                status,
                body,
            },
        }
    }

    pub(crate) fn transport(endpoint: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Transient {
            endpoint: endpoint.into(),
            status: None,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Deserialization {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the server answered. `false` means the request may or may
    /// not have been applied.
    pub fn is_server_response(&self) -> bool {
        !matches!(self, Self::Transient { status: None, .. } | Self::Config(_))
    }

    /// Whether the server refused the request. A 2xx with an unreadable
    /// body was applied and is not a refusal.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Validation { .. }
            | Self::Auth { .. }
            | Self::NotFound { .. }
            | Self::Api { .. } => true,
            Self::Transient { status, .. } => status.is_some(),
            Self::Deserialization { .. } | Self::Config(_) => false,
        }
    }

    /// Short text suitable for showing next to a file entry.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Auth { .. } => "your session has expired, reload the page".into(),
            Self::NotFound { .. } => "missing asset".into(),
            Self::Transient { .. } => "network error, try again".into(),
            other => other.to_string(),
        }
    }
}
