// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

/// Failure of one outbound request. Every variant is recoverable by retrying
/// or navigating back; an empty dataset is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("cannot reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("server reported failure: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Protocol(String),
}

impl FetchError {
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Rejected(_) => "rejected",
            Self::Protocol(_) => "protocol",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "check [api].base_url and that the analytics API is running",
            Self::Status { status, .. } if *status == 404 => {
                "the record may have been removed; refresh the list"
            }
            Self::Status { status, .. } if *status >= 500 => {
                "the analytics API failed; retry in a moment"
            }
            Self::Status { .. } => "the request was refused; check the selection and retry",
            Self::Rejected(_) => "the API refused the request; refresh and retry",
            Self::Protocol(_) => "the API answered in an unexpected shape; check its version",
        }
    }
}
