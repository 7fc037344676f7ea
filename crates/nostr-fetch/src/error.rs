use thiserror::Error;

/// Errors raised synchronously to the caller of a fetch method.
///
/// Per-relay and per-event failures (transport errors, NOTICE, malformed
/// events, bad signatures) are never reported through this type: they are
/// logged and absorbed into "fewer events delivered" instead.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid time range: since ({since}) must be <= until ({until})")]
    InvalidTimeRange { since: u64, until: u64 },

    #[error("limit must be greater than zero")]
    NonPositiveLimit,

    #[error("authorsAndRelays is malformed: {0}")]
    MalformedAuthorsAndRelays(String),

    #[error("relay url is invalid: {0}")]
    InvalidRelayUrl(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Internal to a single relay's `EventStream` (§4.4); a pagination
    /// worker absorbs this into "this relay is done" rather than letting it
    /// reach a caller's top-level `Result`.
    #[error("relay {0} is not connected")]
    RelayNotConnected(String),

    /// Internal to a single relay's `EventStream`, see `RelayNotConnected`.
    #[error("lost connection to relay {0}")]
    RelayDisconnected(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
