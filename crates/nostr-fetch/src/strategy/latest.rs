//! Latest N / last one (§4.7.2, §4.7.3): each relay paginates with a
//! `remainingLimit` quota decremented by locally-new events; once every
//! relay has stopped, the merged, globally-deduped result is sorted desc by
//! `created_at` and passed through the shared verification-mode truncation
//! in [`super::finalize_sorted`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capcache::RelayCapChecker;
use crate::error::Result;
use crate::fanin::{fan_in, RelayPlan};
use crate::options::FetchOptions;
use crate::pool::RelayPool;
use crate::types::{now_secs, Event, Filter};
use crate::{strategy, validate};

pub(crate) async fn fetch_latest_events(
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    relays: Vec<String>,
    filter: Filter,
    n: usize,
    opts: FetchOptions,
    abort: CancellationToken,
) -> Result<Vec<Event>> {
    validate::limit_positive(n)?;

    if !validate::relays_non_empty(&relays) {
        return Ok(Vec::new());
    }

    let eligible = strategy::resolve_eligible_relays(
        pool.as_ref(),
        cap_checker.as_ref(),
        &relays,
        &filter,
        opts.connect_timeout,
    )
    .await;
    if eligible.is_empty() {
        return Ok(Vec::new());
    }

    let starting_until = filter.until.map(|t| t.as_u64()).unwrap_or_else(now_secs);

    // §4.7.2 `reduceVerification`: the driver skips verification so it
    // doesn't spend CPU on events this strategy will truncate away; the
    // strategy re-verifies itself in `finalize_sorted` after sorting.
    let driver_opts = FetchOptions {
        skip_verification: opts.skip_verification || opts.reduce_verification,
        ..opts.clone()
    };

    let plans = eligible
        .into_iter()
        .map(|url| {
            let base_filter = filter.clone();
            let remaining = Arc::new(AtomicI64::new(n as i64));
            let remaining_for_quota = remaining.clone();
            RelayPlan {
                url,
                build_next_filter: Box::new(move |until: u64| {
                    let left = remaining.load(Ordering::Acquire).max(1) as usize;
                    base_filter
                        .clone()
                        .until(nostr::Timestamp::from(until))
                        .limit(left.min(5000))
                }),
                quota_reached: Box::new(move |new_count: usize| {
                    let left = remaining_for_quota.fetch_sub(new_count as i64, Ordering::AcqRel) - new_count as i64;
                    left <= 0
                }),
            }
        })
        .collect();

    let mut rx = fan_in(pool, plans, starting_until, driver_opts, abort);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(strategy::finalize_sorted(events, n, &opts))
}

/// §4.7.3: latest N with `N=1`. Callers typically pass
/// [`FetchOptions::for_last_event`] to get the tighter 1s no-progress
/// timeout.
pub(crate) async fn fetch_last_event(
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    relays: Vec<String>,
    filter: Filter,
    opts: FetchOptions,
    abort: CancellationToken,
) -> Result<Option<Event>> {
    let events = fetch_latest_events(pool, cap_checker, relays, filter, 1, opts, abort).await?;
    Ok(events.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_quota_hits_zero_exactly_at_n() {
        let remaining = Arc::new(AtomicI64::new(3));
        let left = remaining.fetch_sub(3, Ordering::AcqRel) - 3;
        assert_eq!(left, 0);
        assert!(left <= 0);
    }
}
