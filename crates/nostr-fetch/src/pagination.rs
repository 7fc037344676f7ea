//! Pagination loop (C7): drives one relay through repeated REQ/EOSE cycles
//! with a shrinking `until`, deduping locally, until the relay is exhausted,
//! errors, is aborted, or a caller-supplied quota is satisfied.

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use hashbrown::HashSet;
use tokio_util::sync::CancellationToken;

use crate::logging::warn;
use crate::options::FetchOptions;
use crate::pool::{FetchTillEoseOpts, RelayPool};
use crate::subid::SubId;
use crate::types::{Event, EventId, Filter};

/// Outcome of one relay's pagination run, for the orchestrator to log and
/// otherwise ignore (§4.6: "errors in one relay never block or fail other
/// relays").
pub(crate) struct PaginationResult {
    pub errored: bool,
}

/// Drives `url` until `build_next_filter` + `quota_reached` say to stop.
///
/// `build_next_filter(until)` is called once per iteration to produce the
/// refined filter (the per-author variant injects `authors`/`limit` drawn
/// from its bucket table here). `on_new_event` is called for every event
/// this relay hasn't already delivered in this fetch call (local dedup,
/// §4.5 step 3). `quota_reached(new_count)` is polled after every iteration
/// that yielded at least one new event, with the count of locally-new
/// events delivered this iteration (§4.7.2's `remainingLimit` is decremented
/// by exactly this count). `after_iteration` runs once per iteration, after
/// the quota check, for the fan-in channel's backpressure wait (§4.6);
/// callers without backpressure pass a no-op.
pub(crate) async fn paginate(
    pool: &dyn RelayPool,
    url: &str,
    fetch_opts: &FetchOptions,
    abort: &CancellationToken,
    starting_until: u64,
    mut build_next_filter: impl FnMut(u64) -> Filter,
    mut on_new_event: impl FnMut(Event),
    mut quota_reached: impl FnMut(usize) -> bool,
    mut after_iteration: impl FnMut() -> BoxFuture<'static, ()>,
) -> PaginationResult {
    let mut until = starting_until;
    let mut local_seen: HashSet<EventId> = HashSet::new();

    loop {
        let filter = build_next_filter(until);
        let sub_id = SubId::new().to_string();

        let opts = FetchTillEoseOpts {
            skip_verification: fetch_opts.skip_verification,
            connect_timeout: fetch_opts.connect_timeout,
            abort_sub_before_eose_timeout: fetch_opts.abort_sub_before_eose_timeout,
            abort_signal: abort.clone(),
            sub_id,
        };

        let mut stream = pool.fetch_till_eose(url, filter, opts).await;

        let mut new_count = 0usize;
        let mut oldest: Option<u64> = None;
        let mut errored = false;

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    if !local_seen.insert(event.id) {
                        continue;
                    }
                    let created_at = event.created_at.as_u64();
                    oldest = Some(oldest.map_or(created_at, |o: u64| o.min(created_at)));
                    new_count += 1;
                    on_new_event(event);
                }
                Err(e) => {
                    warn!(relay = %url, error = %e, "relay fetch failed");
                    errored = true;
                    break;
                }
            }
        }

        if errored {
            return PaginationResult { errored: true };
        }
        if new_count == 0 {
            return PaginationResult { errored: false };
        }
        if abort.is_cancelled() {
            return PaginationResult { errored: false };
        }
        if quota_reached(new_count) {
            return PaginationResult { errored: false };
        }
        after_iteration().await;

        until = oldest.expect("new_count > 0 implies oldest is set") + 1;
    }
}
