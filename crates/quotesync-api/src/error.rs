use serde::{Deserialize, Serialize};

/// Classification of a failed call to an external API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    RateLimited,
    Server,
    NotFound,
    Unauthorized,
    /// The destination refused the payload (HTTP 422).
    Rejected,
    Client,
    Decode,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connection failed",
            TransportErrorKind::RateLimited => "rate limited",
            TransportErrorKind::Server => "server error",
            TransportErrorKind::NotFound => "not found",
            TransportErrorKind::Unauthorized => "unauthorized",
            TransportErrorKind::Rejected => "rejected",
            TransportErrorKind::Client => "client error",
            TransportErrorKind::Decode => "decode error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Map an HTTP status to an error kind.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => TransportErrorKind::Unauthorized,
            404 => TransportErrorKind::NotFound,
            408 => TransportErrorKind::Timeout,
            422 => TransportErrorKind::Rejected,
            429 => TransportErrorKind::RateLimited,
            500..=599 => TransportErrorKind::Server,
            _ => TransportErrorKind::Client,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout
                | TransportErrorKind::Connect
                | TransportErrorKind::RateLimited
                | TransportErrorKind::Server
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Retries were exhausted on a transient failure.
    Transient,
    NotFound,
    Unauthorized,
    Malformed,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchErrorKind::Transient => "transient",
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Unauthorized => "unauthorized",
            FetchErrorKind::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

impl From<TransportErrorKind> for FetchErrorKind {
    fn from(kind: TransportErrorKind) -> Self {
        match kind {
            TransportErrorKind::Timeout
            | TransportErrorKind::Connect
            | TransportErrorKind::RateLimited
            | TransportErrorKind::Server => FetchErrorKind::Transient,
            TransportErrorKind::NotFound => FetchErrorKind::NotFound,
            TransportErrorKind::Unauthorized => FetchErrorKind::Unauthorized,
            TransportErrorKind::Rejected
            | TransportErrorKind::Client
            | TransportErrorKind::Decode => FetchErrorKind::Malformed,
        }
    }
}

/// The source proposal could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Failed to fetch proposal {proposal_id} ({kind}) after {attempts} attempt(s): {reason}")]
pub struct FetchError {
    pub proposal_id: i64,
    pub kind: FetchErrorKind,
    pub reason: String,
    pub attempts: u32,
}

impl FetchError {
    pub fn from_transport(proposal_id: i64, err: &TransportError, attempts: u32) -> Self {
        Self {
            proposal_id,
            kind: err.kind.into(),
            reason: err.to_string(),
            attempts,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind != FetchErrorKind::Transient
    }
}
