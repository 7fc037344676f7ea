//! Shared data types for the fetch API.
//!
//! Events and filters are the `nostr` crate's own types: they already
//! implement the canonical NIP-01 serialization, event-id computation, and
//! Schnorr signature verification this crate's schema/signature invariants
//! depend on.

use std::time::{SystemTime, UNIX_EPOCH};

pub use nostr::{Event, EventId, Filter, PublicKey};

use crate::error::{FetchError, Result};

/// A caller-supplied `{since?, until?}` time window.
///
/// `since <= until` when both are present; `until` defaults to the current
/// wall-clock time at fetch start when omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRange {
    pub since: Option<u64>,
    pub until: Option<u64>,
}

impl TimeRange {
    pub fn new(since: Option<u64>, until: Option<u64>) -> Self {
        Self { since, until }
    }

    /// Validates `since <= until` and resolves a missing `until` to now.
    pub(crate) fn validate_and_resolve(&self) -> Result<(Option<u64>, u64)> {
        let until = self.until.unwrap_or_else(now_secs);
        if let Some(since) = self.since {
            if since > until {
                return Err(FetchError::InvalidTimeRange { since, until });
            }
        }
        Ok((self.since, until))
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Input to the per-author strategies (§4.7.4): either every author fetched
/// from the same uniform relay set, or a per-author relay mapping.
#[derive(Debug, Clone)]
pub enum AuthorsAndRelays {
    Uniform {
        authors: Vec<PublicKey>,
        relay_urls: Vec<String>,
    },
    PerAuthor(Vec<(PublicKey, Vec<String>)>),
}

impl AuthorsAndRelays {
    /// Transposes the input into a `relay -> [authors]` map, normalizing and
    /// de-duplicating relay URLs per §4.7.4.
    pub(crate) fn transpose(&self) -> Result<hashbrown::HashMap<String, Vec<PublicKey>>> {
        let mut by_relay: hashbrown::HashMap<String, Vec<PublicKey>> = hashbrown::HashMap::new();

        match self {
            AuthorsAndRelays::Uniform {
                authors,
                relay_urls,
            } => {
                if authors.is_empty() {
                    return Ok(by_relay);
                }
                for url in relay_urls {
                    let norm = crate::pool::normalize_relay_url(url)?;
                    by_relay.entry(norm).or_default().extend(authors.iter().copied());
                }
            }
            AuthorsAndRelays::PerAuthor(pairs) => {
                if pairs.is_empty() {
                    return Err(FetchError::MalformedAuthorsAndRelays(
                        "authorsAndRelays is empty".to_string(),
                    ));
                }
                for (author, urls) in pairs {
                    for url in urls {
                        let norm = crate::pool::normalize_relay_url(url)?;
                        let authors_for_relay = by_relay.entry(norm).or_default();
                        if !authors_for_relay.contains(author) {
                            authors_for_relay.push(*author);
                        }
                    }
                }
            }
        }

        for authors in by_relay.values_mut() {
            authors.sort_by_key(|a| a.to_hex());
            authors.dedup();
        }

        Ok(by_relay)
    }

    pub(crate) fn all_authors(&self) -> Vec<PublicKey> {
        match self {
            AuthorsAndRelays::Uniform { authors, .. } => authors.clone(),
            AuthorsAndRelays::PerAuthor(pairs) => {
                let mut authors: Vec<PublicKey> = pairs.iter().map(|(a, _)| *a).collect();
                authors.sort_by_key(|a| a.to_hex());
                authors.dedup();
                authors
            }
        }
    }
}

/// One author's result from `fetch_latest_events_per_author`.
#[derive(Debug, Clone)]
pub struct AuthorEvents {
    pub author: PublicKey,
    pub events: Vec<Event>,
}

/// One author's result from `fetch_last_event_per_author`.
#[derive(Debug, Clone)]
pub struct AuthorLastEvent {
    pub author: PublicKey,
    pub event: Option<Event>,
}
