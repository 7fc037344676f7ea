//! Relay-capability cache (C5): memoized NIP-support lookups over the
//! NIP-11 capability probe (§4.8).

use std::time::Duration;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use nostr::nips::nip11::RelayInformationDocument;
use nostr::Url;
use tokio::sync::RwLock;

use crate::logging::warn;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Injected relay-capability checker (§1, §6).
#[async_trait]
pub trait RelayCapChecker: Send + Sync {
    async fn relay_supports_nips(&self, url: &str, required: &[u16]) -> bool;
}

/// Default checker: one NIP-11 HTTP(S) GET per relay, cached for the
/// lifetime of this value. A probe failure (timeout, connection error,
/// malformed document) caches an empty NIP set rather than retrying on
/// every call.
pub struct CapCache {
    cache: RwLock<HashMap<String, HashSet<u16>>>,
}

impl CapCache {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn nips_for(&self, url: &str) -> HashSet<u16> {
        if let Some(nips) = self.cache.read().await.get(url) {
            return nips.clone();
        }

        let nips = probe(url).await.unwrap_or_default();
        self.cache.write().await.insert(url.to_string(), nips.clone());
        nips
    }
}

impl Default for CapCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayCapChecker for CapCache {
    async fn relay_supports_nips(&self, url: &str, required: &[u16]) -> bool {
        if required.is_empty() {
            return true;
        }
        let nips = self.nips_for(url).await;
        required.iter().all(|nip| nips.contains(nip))
    }
}

async fn probe(url: &str) -> Option<HashSet<u16>> {
    let http_url = to_http_scheme(url)?;
    let parsed = Url::parse(&http_url).ok()?;

    match tokio::time::timeout(PROBE_TIMEOUT, RelayInformationDocument::get(parsed, None)).await {
        Ok(Ok(doc)) => Some(doc.supported_nips.unwrap_or_default().into_iter().collect()),
        Ok(Err(e)) => {
            warn!(relay = %url, error = %e, "NIP-11 probe failed");
            None
        }
        Err(_) => {
            warn!(relay = %url, "NIP-11 probe timed out");
            None
        }
    }
}

fn to_http_scheme(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("wss://") {
        Some(format!("https://{rest}"))
    } else if let Some(rest) = url.strip_prefix("ws://") {
        Some(format!("http://{rest}"))
    } else {
        None
    }
}
