//! Latest-N-per-author / last-per-author (§4.7.4, §4.7.5): one bucket table
//! per relay, capped at N per author; a (author, relay) latch resolves the
//! moment that author's bucket on that relay fulfills; a merger task per
//! author awaits every latch carrying it, merges, dedupes, sorts, and
//! truncates through the same verification-mode logic as §4.7.2.

use std::sync::{Arc, Mutex as StdMutex};

use hashbrown::{HashMap, HashSet};
use nostr::{PublicKey, Timestamp};
use tokio_util::sync::CancellationToken;

use crate::bucket::{BucketState, EventBucketTable};
use crate::capcache::RelayCapChecker;
use crate::error::Result;
use crate::latch_matrix::LatchMatrix;
use crate::logging::debug;
use crate::options::FetchOptions;
use crate::pagination::paginate;
use crate::pool::RelayPool;
use crate::types::{now_secs, AuthorEvents, AuthorLastEvent, AuthorsAndRelays, Event, Filter};
use crate::{strategy, validate};

pub(crate) async fn fetch_latest_events_per_author(
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    authors_and_relays: AuthorsAndRelays,
    filter: Filter,
    n: usize,
    opts: FetchOptions,
    abort: CancellationToken,
) -> Result<Vec<AuthorEvents>> {
    validate::limit_positive(n)?;

    let all_authors = authors_and_relays.all_authors();
    if !validate::authors_non_empty(&all_authors) {
        return Ok(Vec::new());
    }

    let by_relay = authors_and_relays.transpose()?;
    if !validate::per_author_relays_non_empty(&by_relay) {
        return Ok(Vec::new());
    }

    let relay_urls: Vec<String> = by_relay.keys().cloned().collect();
    let eligible: HashSet<String> = strategy::resolve_eligible_relays(
        pool.as_ref(),
        cap_checker.as_ref(),
        &relay_urls,
        &filter,
        opts.connect_timeout,
    )
    .await
    .into_iter()
    .collect();

    let by_relay: HashMap<String, Vec<PublicKey>> = by_relay
        .into_iter()
        .filter(|(url, _)| eligible.contains(url))
        .collect();

    if by_relay.is_empty() {
        return Ok(all_authors
            .into_iter()
            .map(|author| AuthorEvents {
                author,
                events: Vec::new(),
            })
            .collect());
    }

    let matrix: Arc<LatchMatrix<PublicKey, String, Vec<Event>>> = Arc::new(LatchMatrix::build(&by_relay));

    // Per §4.7.2's reduceVerification, reused verbatim here.
    let driver_opts = FetchOptions {
        skip_verification: opts.skip_verification || opts.reduce_verification,
        ..opts.clone()
    };

    let mut relay_handles = Vec::with_capacity(by_relay.len());
    for (url, authors) in by_relay {
        let pool = pool.clone();
        let driver_opts = driver_opts.clone();
        let abort = abort.clone();
        let matrix = matrix.clone();
        let base_filter = filter.clone();

        relay_handles.push(tokio::spawn(async move {
            run_relay_bucket_worker(pool, url, authors, base_filter, n, driver_opts, abort, matrix).await;
        }));
    }

    let mut merger_handles = Vec::with_capacity(all_authors.len());
    for author in all_authors {
        let matrix = matrix.clone();
        let opts = opts.clone();
        merger_handles.push(tokio::spawn(async move {
            let events = merge_author_events(&matrix, &author, n, &opts).await;
            AuthorEvents { author, events }
        }));
    }

    let mut results = Vec::with_capacity(merger_handles.len());
    for h in merger_handles {
        match h.await {
            Ok(author_events) => results.push(author_events),
            Err(e) => debug!(error = %e, "per-author merger task panicked"),
        }
    }

    for h in relay_handles {
        let _ = h.await;
    }

    Ok(results)
}

/// §4.7.5: latest-per-author with `N=1`.
pub(crate) async fn fetch_last_event_per_author(
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    authors_and_relays: AuthorsAndRelays,
    filter: Filter,
    opts: FetchOptions,
    abort: CancellationToken,
) -> Result<Vec<AuthorLastEvent>> {
    let results = fetch_latest_events_per_author(pool, cap_checker, authors_and_relays, filter, 1, opts, abort).await?;
    Ok(results
        .into_iter()
        .map(|ae| AuthorLastEvent {
            author: ae.author,
            event: ae.events.into_iter().next(),
        })
        .collect())
}

#[allow(clippy::too_many_arguments)]
async fn run_relay_bucket_worker(
    pool: Arc<dyn RelayPool>,
    url: String,
    authors: Vec<PublicKey>,
    base_filter: Filter,
    cap_per_author: usize,
    driver_opts: FetchOptions,
    abort: CancellationToken,
    matrix: Arc<LatchMatrix<PublicKey, String, Vec<Event>>>,
) {
    let starting_until = base_filter.until.map(|t| t.as_u64()).unwrap_or_else(now_secs);
    let bucket = Arc::new(StdMutex::new(EventBucketTable::new(authors, cap_per_author)));

    let build_next_filter = {
        let bucket = bucket.clone();
        let base_filter = base_filter.clone();
        move |until: u64| {
            let (keys, limit) = bucket.lock().unwrap().calc_keys_and_limit_for_next_req();
            base_filter
                .clone()
                .authors(keys)
                .until(Timestamp::from(until))
                .limit(limit.max(1).min(5000))
        }
    };

    let on_new_event = {
        let bucket = bucket.clone();
        let matrix = matrix.clone();
        let url = url.clone();
        move |event: Event| {
            let author = event.pubkey;
            let result = bucket.lock().unwrap().add(&author, event);
            if result.state == BucketState::Fulfilled {
                if let Some(latch) = matrix.latch(&author, &url) {
                    latch.resolve(result.events.expect("fulfilled insert carries events"));
                }
            }
        }
    };

    let quota_reached = {
        let bucket = bucket.clone();
        move |_new_count: usize| bucket.lock().unwrap().all_fulfilled()
    };

    let after_iteration = || -> futures_util::future::BoxFuture<'static, ()> { Box::pin(async {}) };

    let result = paginate(
        pool.as_ref(),
        &url,
        &driver_opts,
        &abort,
        starting_until,
        build_next_filter,
        on_new_event,
        quota_reached,
        after_iteration,
    )
    .await;

    if result.errored {
        debug!(relay = %url, "relay dropped from per-author fetch after an error");
    }

    // §4.7.4: on any early termination (error, no-new-events, abort, or
    // quota already reached), resolve every latch this relay still owns
    // with whatever its bucket currently holds. A latch already resolved by
    // `on_new_event` above is a no-op here.
    for (author, latch) in matrix.entries_for_relay(&url) {
        let current = bucket
            .lock()
            .unwrap()
            .get_bucket(&author)
            .map(|events| events.to_vec())
            .unwrap_or_default();
        latch.resolve(current);
    }
}

async fn merge_author_events(
    matrix: &LatchMatrix<PublicKey, String, Vec<Event>>,
    author: &PublicKey,
    n: usize,
    opts: &FetchOptions,
) -> Vec<Event> {
    let handles = matrix.handles_for_key(author);
    let mut merged: Vec<Event> = Vec::new();
    let mut seen = HashSet::new();

    for handle in handles {
        match handle.wait().await {
            Ok(events) => {
                for event in events {
                    if seen.insert(event.id) {
                        merged.push(event);
                    }
                }
            }
            Err(e) => debug!(author = %author, error = %e, "per-relay bucket latch rejected"),
        }
    }

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    strategy::finalize_sorted(merged, n, opts)
}
