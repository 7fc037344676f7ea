//! A scripted [`RelayPool`] double driving the crate's integration tests.
//!
//! Each relay gets a queue of [`Page`]s; every `fetch_till_eose` call pops
//! the next page for that relay (or, once the queue is empty, behaves as an
//! exhausted relay: immediate EOSE with no events, ending the pagination
//! loop). This lets a test script exactly the sequence of sub-requests a
//! relay will see across one fetch call's pagination.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use nostr_fetch::{
    DefaultVerifier, EnsureRelaysOpts, Event, EventStream, FetchError, FetchTillEoseOpts, Filter, RelayCapChecker,
    RelayPool, Verifier,
};

/// One sub-request's scripted behavior.
pub enum Page {
    /// Deliver `events`, then `EOSE` (§4.4 step 5).
    Events(Vec<Event>),
    /// Deliver `events`, then a `NOTICE` (§4.4 step 7): the subscription
    /// ends cleanly and `CLOSE` is sent, same as EOSE from the pagination
    /// loop's point of view.
    EventsThenNotice(Vec<Event>),
    /// Deliver `events`, then a transport error (§4.4 step 8): the stream
    /// ends with an `Err`, and no `CLOSE` is sent.
    EventsThenError(Vec<Event>),
    /// Deliver `events` with no further activity for longer than the
    /// caller's `abort_sub_before_eose_timeout`: the no-progress timeout
    /// fires (§4.4 step 6), `CLOSE` is sent, and the stream ends cleanly.
    EventsThenSilence(Vec<Event>),
    /// Deliver `events` one at a time, `pace` apart, to give an external
    /// abort signal a chance to fire mid-stream (§4.4 step 9).
    EventsPaced(Vec<Event>, Duration),
}

struct RelayScript {
    pages: VecDeque<Page>,
    /// Whether this relay is reachable at all (`ensure_relays`); defaults to
    /// `true` once a script is registered.
    connects: bool,
}

#[derive(Default)]
struct Inner {
    scripts: StdMutex<HashMap<String, RelayScript>>,
    /// `(relay, sub_id)` pairs for which a `CLOSE` would have been sent.
    closed: StdMutex<Vec<(String, String)>>,
    /// Every `REQ` sent, in order, as `(relay, filter)`.
    sent_reqs: StdMutex<Vec<(String, Filter)>>,
}

/// Cheaply `Clone` (shared `Arc` state), so a test can keep a handle for
/// post-call assertions after moving a clone into
/// `NostrFetcher::with_custom_pool`.
#[derive(Default, Clone)]
pub struct MockRelayPool {
    inner: Arc<Inner>,
}

impl MockRelayPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pages` as the scripted sub-request sequence for `relay`.
    /// Once the relay's `ensure_relays` is called it is considered
    /// reachable.
    pub fn script(&self, relay: &str, pages: Vec<Page>) {
        self.inner.scripts.lock().unwrap().insert(
            relay.to_string(),
            RelayScript {
                pages: pages.into(),
                connects: true,
            },
        );
    }

    /// Registers `relay` as unreachable: `ensure_relays` will never include
    /// it.
    pub fn unreachable(&self, relay: &str) {
        self.inner.scripts.lock().unwrap().insert(
            relay.to_string(),
            RelayScript {
                pages: VecDeque::new(),
                connects: false,
            },
        );
    }

    pub fn closed_subs(&self) -> Vec<(String, String)> {
        self.inner.closed.lock().unwrap().clone()
    }

    pub fn sent_req_count(&self, relay: &str) -> usize {
        self.inner
            .sent_reqs
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == relay)
            .count()
    }
}

#[async_trait]
impl RelayPool for MockRelayPool {
    async fn ensure_relays(&self, urls: &[String], _opts: EnsureRelaysOpts) -> Vec<String> {
        let scripts = self.inner.scripts.lock().unwrap();
        urls.iter()
            .filter(|u| scripts.get(u.as_str()).map(|s| s.connects).unwrap_or(false))
            .cloned()
            .collect()
    }

    async fn fetch_till_eose(&self, url: &str, filter: Filter, opts: FetchTillEoseOpts) -> EventStream {
        self.inner.sent_reqs.lock().unwrap().push((url.to_string(), filter));

        let page = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|s| s.pages.pop_front());

        let url = url.to_string();

        let skip_verification = opts.skip_verification;

        match page {
            None => {
                // Exhausted: immediate EOSE, no events.
                self.record_close(&url, &opts.sub_id);
                Box::pin(futures_util::stream::empty())
            }
            Some(Page::Events(events)) => {
                self.record_close(&url, &opts.sub_id);
                events_stream(filter_unless_skipped(events, skip_verification))
            }
            Some(Page::EventsThenNotice(events)) => {
                self.record_close(&url, &opts.sub_id);
                events_stream(filter_unless_skipped(events, skip_verification))
            }
            Some(Page::EventsThenError(events)) => {
                error_stream(filter_unless_skipped(events, skip_verification), url)
            }
            Some(Page::EventsThenSilence(events)) => {
                self.record_close(&url, &opts.sub_id);
                silent_then_end_stream(
                    filter_unless_skipped(events, skip_verification),
                    opts.abort_sub_before_eose_timeout,
                )
            }
            Some(Page::EventsPaced(events, pace)) => {
                paced_stream(filter_unless_skipped(events, skip_verification), pace, opts.abort_signal)
            }
        }
    }

    async fn shutdown(&self) {}
}

impl MockRelayPool {
    fn record_close(&self, url: &str, sub_id: &str) {
        self.inner
            .closed
            .lock()
            .unwrap()
            .push((url.to_string(), sub_id.to_string()));
    }
}

/// Mirrors `DefaultRelayPool`'s own fetch_till_eose contract (§4.4): unless
/// verification is skipped, drop events with an invalid signature before
/// they ever reach the pagination loop.
fn filter_unless_skipped(events: Vec<Event>, skip_verification: bool) -> Vec<Event> {
    if skip_verification {
        events
    } else {
        events.into_iter().filter(|e| DefaultVerifier.verify(e)).collect()
    }
}

fn events_stream(events: Vec<Event>) -> EventStream {
    Box::pin(futures_util::stream::iter(events.into_iter().map(Ok)))
}

fn error_stream(events: Vec<Event>, url: String) -> EventStream {
    use futures_util::StreamExt;
    let tail = futures_util::stream::once(async move { Err(FetchError::RelayDisconnected(url)) });
    Box::pin(futures_util::stream::iter(events.into_iter().map(Ok)).chain(tail))
}

/// Delivers `events` immediately, then ends the stream only after a sleep
/// just past `no_progress_timeout` — simulating DefaultRelayPool's
/// no-progress timeout (§4.4 step 6) without re-deriving its racing logic.
fn silent_then_end_stream(events: Vec<Event>, no_progress_timeout: Duration) -> EventStream {
    let wait = no_progress_timeout + Duration::from_millis(10);
    Box::pin(futures_util::stream::unfold(
        (VecDeque::from(events), Some(wait)),
        |(mut remaining, mut wait)| async move {
            if let Some(event) = remaining.pop_front() {
                return Some((Ok(event), (remaining, wait)));
            }
            tokio::time::sleep(wait.take()?).await;
            None
        },
    ))
}

fn paced_stream(events: Vec<Event>, pace: Duration, abort: tokio_util::sync::CancellationToken) -> EventStream {
    use futures_util::StreamExt;
    Box::pin(futures_util::stream::unfold(
        (VecDeque::from(events), abort),
        move |(mut remaining, abort)| {
            let pace = pace;
            async move {
                if abort.is_cancelled() {
                    return None;
                }
                let event = remaining.pop_front()?;
                tokio::select! {
                    _ = abort.cancelled() => None,
                    _ = tokio::time::sleep(pace) => Some((Ok(event), (remaining, abort))),
                }
            }
        },
    ))
}

/// Builds a signed text-note event with a specific `created_at`, for tests
/// that need control over pagination ordering.
pub fn signed_event(keys: &nostr::Keys, content: &str, created_at: u64) -> Event {
    nostr::EventBuilder::new(nostr::Kind::TextNote, content)
        .custom_created_at(nostr::Timestamp::from(created_at))
        .sign_with_keys(keys)
        .expect("sign event")
}

/// Returns a structurally-valid event whose signature does not verify: it
/// carries another real event's signature, which has the right shape (schema
/// passes) but is wrong for this event's id (signature check fails).
pub fn unsigned_looking_event(keys: &nostr::Keys, content: &str, created_at: u64) -> Event {
    let real = signed_event(keys, content, created_at);
    let decoy = signed_event(keys, "decoy", created_at.wrapping_add(1));
    let mut tampered = real;
    tampered.sig = decoy.sig;
    tampered
}

pub fn no_such_nip_required_filter() -> Filter {
    nostr::Filter::new().search("needle")
}

pub fn empty_eligible_relay_set() -> HashSet<String> {
    HashSet::new()
}

/// Installs a `tracing-subscriber` gated by `RUST_LOG`, once per test
/// binary, so `cargo test -- --nocapture` shows the crate's own diagnostics
/// (the crate itself never installs one, per its logging contract).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    });
}

/// A [`RelayCapChecker`] that never has any NIP cached for any relay, for
/// tests that need the capability-gating behavior without a real NIP-11
/// probe over the network.
#[derive(Default)]
pub struct NoCapsChecker;

#[async_trait]
impl RelayCapChecker for NoCapsChecker {
    async fn relay_supports_nips(&self, _url: &str, required: &[u16]) -> bool {
        required.is_empty()
    }
}
