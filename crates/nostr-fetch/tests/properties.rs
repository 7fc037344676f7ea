//! Testable properties (§8) exercised through the public API against a
//! scripted pool, beyond what the per-module unit tests already cover.

mod common;

use nostr::Keys;
use nostr_fetch::{CapCache, FetchError, FetchOptions, FetcherOptions, Filter, NostrFetcher, TimeRange};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{signed_event, MockRelayPool, NoCapsChecker, Page};

const RELAY1: &str = "wss://relay1.example.com";
const RELAY2: &str = "wss://relay2.example.com";

fn fetcher(pool: MockRelayPool) -> NostrFetcher {
    NostrFetcher::with_custom_pool(pool, FetcherOptions::default(), None::<CapCache>)
}

/// Invariant 1 (Dedup): the same event id delivered by two different relays
/// is only emitted once.
#[tokio::test]
async fn dedup_across_relays() {
    common::init_tracing();
    let keys = Keys::generate();
    let shared = signed_event(&keys, "shared", 1_700_000_000);

    let pool = MockRelayPool::new();
    pool.script(RELAY1, vec![Page::Events(vec![shared.clone()])]);
    pool.script(RELAY2, vec![Page::Events(vec![shared])]);

    let fetcher = fetcher(pool);
    let events = fetcher
        .fetch_all_events(
            vec![RELAY1.to_string(), RELAY2.to_string()],
            Filter::new(),
            TimeRange::default(),
            FetchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .expect("valid input");

    assert_eq!(events.len(), 1, "the same event id from two relays must dedup to one");
}

/// Invariant 8 (Sorted output): `fetchAllEvents({sort:true})` sorts by
/// `created_at` descending regardless of per-relay arrival order.
#[tokio::test]
async fn sorted_output_when_sort_is_requested() {
    common::init_tracing();
    let keys = Keys::generate();
    let events = vec![
        signed_event(&keys, "oldest", 1_700_000_000),
        signed_event(&keys, "newest", 1_700_000_999),
        signed_event(&keys, "middle", 1_700_000_500),
    ];

    let pool = MockRelayPool::new();
    pool.script(RELAY1, vec![Page::Events(events)]);

    let fetcher = fetcher(pool);
    let events = fetcher
        .fetch_all_events(
            vec![RELAY1.to_string()],
            Filter::new(),
            TimeRange::default(),
            FetchOptions::default().sort(true),
            CancellationToken::new(),
        )
        .await
        .expect("valid input");

    let created_at: Vec<u64> = events.iter().map(|e| e.created_at.as_u64()).collect();
    assert_eq!(created_at, vec![1_700_000_999, 1_700_000_500, 1_700_000_000]);
}

/// Boundary: an empty relay list yields an empty result with no connection
/// attempts, rather than an error.
#[tokio::test]
async fn empty_relay_list_yields_empty_result_without_connecting() {
    common::init_tracing();
    let pool = MockRelayPool::new();
    pool.script(RELAY1, vec![Page::Events(vec![])]);

    let fetcher = fetcher(pool.clone());
    let events = fetcher
        .fetch_all_events(
            Vec::new(),
            Filter::new(),
            TimeRange::default(),
            FetchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .expect("an empty relay list is a warning, not an error");

    assert!(events.is_empty());
    assert_eq!(pool.sent_req_count(RELAY1), 0);
}

/// Boundary: `since > until` is a caller-input error, raised synchronously.
#[tokio::test]
async fn since_after_until_is_rejected_before_any_io() {
    common::init_tracing();
    let pool = MockRelayPool::new();
    let fetcher = fetcher(pool.clone());

    let result = fetcher
        .fetch_all_events(
            vec![RELAY1.to_string()],
            Filter::new(),
            TimeRange::new(Some(200), Some(100)),
            FetchOptions::default(),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(FetchError::InvalidTimeRange { since: 200, until: 100 })));
    assert_eq!(pool.sent_req_count(RELAY1), 0, "no REQ should be sent for a rejected time range");
}

/// Boundary: `limit == 0` is a caller-input error for the latest-N family.
#[tokio::test]
async fn zero_limit_is_rejected_for_latest_n() {
    common::init_tracing();
    let pool = MockRelayPool::new();
    let fetcher = fetcher(pool);

    let result = fetcher
        .fetch_latest_events(
            vec![RELAY1.to_string()],
            Filter::new(),
            0,
            FetchOptions::default(),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(FetchError::NonPositiveLimit)));
}

/// Boundary: a relay whose `search` filter requires NIP-50, which it lacks,
/// is excluded from the eligible set; the fetch proceeds without it.
#[tokio::test]
async fn relay_lacking_required_nip_is_excluded() {
    common::init_tracing();
    let keys = Keys::generate();
    let pool = MockRelayPool::new();
    pool.script(RELAY1, vec![Page::Events(vec![signed_event(&keys, "note", 1_700_000_000)])]);

    let fetcher = NostrFetcher::with_custom_pool(pool.clone(), FetcherOptions::default(), Some(NoCapsChecker));
    let events = fetcher
        .fetch_all_events(
            vec![RELAY1.to_string()],
            common::no_such_nip_required_filter(),
            TimeRange::default(),
            FetchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .expect("valid input");

    // `NoCapsChecker` never reports NIP-50 support, so the relay is excluded
    // from the eligible set and no REQ is ever sent.
    assert!(events.is_empty());
    assert_eq!(pool.sent_req_count(RELAY1), 0);
}
