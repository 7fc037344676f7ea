//! The injected `RelayPool` capability (§1, §6) plus a concrete default
//! implementation backed by `tokio-tungstenite`.

pub mod default;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::types::{Event, Filter};

pub use default::DefaultRelayPool;

#[derive(Debug, Clone)]
pub struct EnsureRelaysOpts {
    pub connect_timeout: Duration,
}

/// Options threaded into a single `fetchTillEose` sub-request (§4.4).
#[derive(Clone)]
pub struct FetchTillEoseOpts {
    pub skip_verification: bool,
    pub connect_timeout: Duration,
    pub abort_sub_before_eose_timeout: Duration,
    pub abort_signal: CancellationToken,
    pub sub_id: String,
}

pub type EventStream = BoxStream<'static, Result<Event, FetchError>>;

/// The collaborator contract §6 specifies: connection pooling and raw
/// WebSocket transport are out of scope for the core, but the core drives
/// every relay interaction through this trait.
#[async_trait]
pub trait RelayPool: Send + Sync {
    /// Returns the subset of `urls` successfully connected within
    /// `opts.connect_timeout`. Idempotent; may reuse existing connections.
    async fn ensure_relays(&self, urls: &[String], opts: EnsureRelaysOpts) -> Vec<String>;

    /// Drives one REQ/EOSE cycle against `url`, per §4.4.
    async fn fetch_till_eose(&self, url: &str, filter: Filter, opts: FetchTillEoseOpts) -> EventStream;

    async fn shutdown(&self);
}

/// Canonicalizes scheme/host/port and lowercases the host, so the same
/// logical relay reached via different spellings collapses to one entry
/// (§4.7.4).
pub(crate) fn normalize_relay_url(raw: &str) -> Result<String, FetchError> {
    let mut parsed =
        url::Url::parse(raw).map_err(|_| FetchError::InvalidRelayUrl(raw.to_string()))?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "ws" && scheme != "wss" {
        return Err(FetchError::InvalidRelayUrl(raw.to_string()));
    }
    let _ = parsed.set_scheme(&scheme);

    if let Some(host) = parsed.host_str() {
        let host = host.to_ascii_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|_| FetchError::InvalidRelayUrl(raw.to_string()))?;
    }

    let default_port = if scheme == "wss" { 443 } else { 80 };
    if parsed.port() == Some(default_port) {
        let _ = parsed.set_port(None);
    }

    let mut normalized = parsed.to_string();
    if normalized.ends_with('/') && parsed.path() == "/" {
        normalized.pop();
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_host_case_and_default_port() {
        let a = normalize_relay_url("WSS://Relay.Example.com:443/").unwrap();
        let b = normalize_relay_url("wss://relay.example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_websocket_schemes() {
        assert!(normalize_relay_url("https://relay.example.com").is_err());
    }
}
