//! Unified error types for the activity pipeline.
//!
//! Error codes:
//! - SRC_001-004: Upstream source faults
//! - DB_001: Persistence faults
//! - CFG_001: Configuration faults

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of response body bytes kept on a fault.
const MAX_BODY_SNIPPET: usize = 512;

/// Upstream source error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorCode {
    /// SRC_001: Upstream rejected the request (4xx)
    ClientFault,
    /// SRC_002: Upstream failed transiently (5xx)
    ServerFault,
    /// SRC_003: Response did not match the expected shape
    Decode,
    /// SRC_004: Connection, TLS or timeout failure
    Transport,
}

impl SourceErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClientFault => "SRC_001",
            Self::ServerFault => "SRC_002",
            Self::Decode => "SRC_003",
            Self::Transport => "SRC_004",
        }
    }
}

/// Unified error type for the activity pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Upstream answered with a 4xx status.
    #[error("[SRC_001] upstream rejected request with {status}: {body}")]
    ClientFault { status: u16, body: String },

    /// Upstream answered with a 5xx status.
    #[error("[SRC_002] upstream failed with {status}: {body}")]
    ServerFault { status: u16, body: String },

    /// Upstream payload could not be decoded into the expected shape.
    #[error("[SRC_003] failed to decode {context}: {message}")]
    Decode {
        context: String,
        message: String,
        raw: String,
    },

    /// The request never produced a response.
    #[error("[SRC_004] upstream transport error: {0}")]
    Transport(String),

    #[error("[DB_001] persistence error: {0}")]
    Persistence(String),

    #[error("[CFG_001] configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a non-success upstream status.
    ///
    /// 4xx becomes a client fault and 5xx a server fault. Any other
    /// non-success status is treated as a transport problem.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = truncate_snippet(body.into());
        match status {
            400..=499 => Self::ClientFault { status, body },
            500..=599 => Self::ServerFault { status, body },
            _ => Self::Transport(format!("unexpected status {}: {}", status, body)),
        }
    }

    /// Create a decode fault, keeping a bounded slice of the raw payload.
    pub fn decode(
        context: impl Into<String>,
        message: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.into(),
            raw: truncate_snippet(raw.into()),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the next scheduled tick may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerFault { .. } | Self::Transport(_) | Self::Persistence(_)
        )
    }

    /// Upstream HTTP status, if the fault came from a response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::ClientFault { status, .. } | Self::ServerFault { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::ClientFault { .. } => Some(SourceErrorCode::ClientFault.code()),
            Self::ServerFault { .. } => Some(SourceErrorCode::ServerFault.code()),
            Self::Decode { .. } => Some(SourceErrorCode::Decode.code()),
            Self::Transport(_) => Some(SourceErrorCode::Transport.code()),
            Self::Persistence(_) => Some("DB_001"),
            Self::Config(_) => Some("CFG_001"),
            _ => None,
        }
    }

    /// Get the HTTP status code for this error when surfaced by the API.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ClientFault { .. } => 502,
            Self::ServerFault { .. } => 502,
            Self::Decode { .. } => 502,
            Self::Transport(_) => 504,
            Self::Persistence(_) => 500,
            Self::Config(_) => 500,
            Self::Serialization(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}

fn truncate_snippet(mut body: String) -> String {
    if body.len() > MAX_BODY_SNIPPET {
        let mut cut = MAX_BODY_SNIPPET;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
