//! `nostr-fetch`: fetch historical events from a federation of Nostr relays
//! over WebSocket.
//!
//! [`NostrFetcher`] drives the four public fetch strategies (§4.7) on top of
//! an injected [`RelayPool`] and [`RelayCapChecker`]: paginate every relay
//! backwards in time, dedupe across the federation, and hand back a
//! bounded, cancellable stream or a collected/sorted `Vec`.
//! [`NostrFetcher::init`] wires up the concrete defaults ([`DefaultRelayPool`]
//! over `tokio-tungstenite`, [`CapCache`] over the `nostr` crate's NIP-11
//! client) so a caller who doesn't need a custom transport never has to
//! construct one.

mod bucket;
mod capcache;
mod channel;
mod error;
mod fanin;
mod latch;
mod latch_matrix;
mod logging;
mod options;
mod pagination;
mod pool;
mod strategy;
mod subid;
mod types;
mod validate;
mod verify;

pub use capcache::{CapCache, RelayCapChecker};
pub use channel::BoundedReceiver as EventIterator;
pub use error::{FetchError, Result};
pub use options::{FetchOptions, FetcherOptions, LogLevel};
pub use pool::{DefaultRelayPool, EnsureRelaysOpts, EventStream, FetchTillEoseOpts, RelayPool};
pub use types::{AuthorEvents, AuthorLastEvent, AuthorsAndRelays, Event, EventId, Filter, PublicKey, TimeRange};
pub use verify::{DefaultVerifier, Verifier};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Entry point for the fetch API (§6). Owns its injected [`RelayPool`] and
/// [`RelayCapChecker`] for its lifetime, until [`NostrFetcher::shutdown`].
pub struct NostrFetcher {
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    options: FetcherOptions,
}

impl NostrFetcher {
    /// Constructs a fetcher over the default `tokio-tungstenite`-backed pool
    /// and NIP-11 capability cache.
    pub fn init(options: FetcherOptions) -> Self {
        Self::with_custom_pool(DefaultRelayPool::new(), options, None::<CapCache>)
    }

    /// Constructs a fetcher over a caller-supplied [`RelayPool`], optionally
    /// with a caller-supplied [`RelayCapChecker`] (defaults to [`CapCache`]
    /// when `None`).
    pub fn with_custom_pool(
        pool: impl RelayPool + 'static,
        options: FetcherOptions,
        cap_checker: Option<impl RelayCapChecker + 'static>,
    ) -> Self {
        options::set_log_gate(options.min_log_level);
        Self {
            pool: Arc::new(pool),
            cap_checker: cap_checker
                .map(|c| Arc::new(c) as Arc<dyn RelayCapChecker>)
                .unwrap_or_else(|| Arc::new(CapCache::new())),
            options,
        }
    }

    /// The options this fetcher was constructed with (§6 `minLogLevel`).
    pub fn options(&self) -> &FetcherOptions {
        &self.options
    }

    /// §4.7.1: every event matching `filter` in `time_range`, across
    /// `relays`, as an unbounded, backpressured stream. Output order is
    /// unspecified; use [`Self::fetch_all_events`] for a sorted `Vec`.
    pub async fn all_events_iterator(
        &self,
        relays: Vec<String>,
        filter: Filter,
        time_range: TimeRange,
        opts: FetchOptions,
        abort: CancellationToken,
    ) -> Result<EventIterator<Event>> {
        strategy::all::all_events_iterator(
            self.pool.clone(),
            self.cap_checker.clone(),
            relays,
            filter,
            time_range,
            opts,
            abort,
        )
        .await
    }

    /// Drains [`Self::all_events_iterator`] into a `Vec`, sorting by
    /// `created_at` descending when `opts.sort` is set.
    pub async fn fetch_all_events(
        &self,
        relays: Vec<String>,
        filter: Filter,
        time_range: TimeRange,
        opts: FetchOptions,
        abort: CancellationToken,
    ) -> Result<Vec<Event>> {
        strategy::all::fetch_all_events(
            self.pool.clone(),
            self.cap_checker.clone(),
            relays,
            filter,
            time_range,
            opts,
            abort,
        )
        .await
    }

    /// §4.7.2: the `n` most recent events matching `filter` across `relays`,
    /// sorted by `created_at` descending.
    pub async fn fetch_latest_events(
        &self,
        relays: Vec<String>,
        filter: Filter,
        n: usize,
        opts: FetchOptions,
        abort: CancellationToken,
    ) -> Result<Vec<Event>> {
        strategy::latest::fetch_latest_events(self.pool.clone(), self.cap_checker.clone(), relays, filter, n, opts, abort)
            .await
    }

    /// §4.7.3: the single most recent event matching `filter`. `opts`
    /// defaults to [`FetchOptions::for_last_event`] (a 1s no-progress
    /// timeout instead of the usual 10s) when `None`.
    pub async fn fetch_last_event(
        &self,
        relays: Vec<String>,
        filter: Filter,
        opts: Option<FetchOptions>,
        abort: CancellationToken,
    ) -> Result<Option<Event>> {
        let opts = opts.unwrap_or_else(FetchOptions::for_last_event);
        strategy::latest::fetch_last_event(self.pool.clone(), self.cap_checker.clone(), relays, filter, opts, abort).await
    }

    /// §4.7.4: the `n` most recent events per author, across each author's
    /// assigned relays.
    pub async fn fetch_latest_events_per_author(
        &self,
        authors_and_relays: AuthorsAndRelays,
        filter: Filter,
        n: usize,
        opts: FetchOptions,
        abort: CancellationToken,
    ) -> Result<Vec<AuthorEvents>> {
        strategy::per_author::fetch_latest_events_per_author(
            self.pool.clone(),
            self.cap_checker.clone(),
            authors_and_relays,
            filter,
            n,
            opts,
            abort,
        )
        .await
    }

    /// §4.7.5: the single most recent event per author. `opts` defaults to
    /// [`FetchOptions::for_last_event`] when `None`.
    pub async fn fetch_last_event_per_author(
        &self,
        authors_and_relays: AuthorsAndRelays,
        filter: Filter,
        opts: Option<FetchOptions>,
        abort: CancellationToken,
    ) -> Result<Vec<AuthorLastEvent>> {
        let opts = opts.unwrap_or_else(FetchOptions::for_last_event);
        strategy::per_author::fetch_last_event_per_author(
            self.pool.clone(),
            self.cap_checker.clone(),
            authors_and_relays,
            filter,
            opts,
            abort,
        )
        .await
    }

    /// Delegates to the injected pool's `shutdown` (§5): closes every
    /// connection; fetches already in flight observe connection errors and
    /// terminate cleanly rather than hanging.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
