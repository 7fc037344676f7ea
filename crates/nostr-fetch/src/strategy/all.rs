//! All events in range (§4.7.1): an unbounded pagination loop per relay,
//! fanned into a single stream. Output order is unspecified; the collector
//! variant optionally sorts by `created_at` descending.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capcache::RelayCapChecker;
use crate::channel::BoundedReceiver;
use crate::error::Result;
use crate::fanin::{fan_in, RelayPlan};
use crate::options::FetchOptions;
use crate::pool::RelayPool;
use crate::types::{Event, Filter, TimeRange};
use crate::{strategy, validate};

#[allow(clippy::too_many_arguments)]
pub(crate) async fn all_events_iterator(
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    relays: Vec<String>,
    filter: Filter,
    range: TimeRange,
    opts: FetchOptions,
    abort: CancellationToken,
) -> Result<BoundedReceiver<Event>> {
    let (since, until) = validate::time_range(&range)?;

    if !validate::relays_non_empty(&relays) {
        return Ok(empty_stream());
    }

    let eligible =
        strategy::resolve_eligible_relays(pool.as_ref(), cap_checker.as_ref(), &relays, &filter, opts.connect_timeout).await;
    if eligible.is_empty() {
        return Ok(empty_stream());
    }

    let limit = opts.effective_limit_per_req();
    let plans = eligible
        .into_iter()
        .map(|url| {
            let base_filter = filter.clone();
            RelayPlan {
                url,
                build_next_filter: Box::new(move |iter_until: u64| {
                    build_refined_filter(&base_filter, since, iter_until, limit)
                }),
                quota_reached: Box::new(|_new_count| false),
            }
        })
        .collect();

    Ok(fan_in(pool, plans, until, opts, abort))
}

pub(crate) async fn fetch_all_events(
    pool: Arc<dyn RelayPool>,
    cap_checker: Arc<dyn RelayCapChecker>,
    relays: Vec<String>,
    filter: Filter,
    range: TimeRange,
    opts: FetchOptions,
    abort: CancellationToken,
) -> Result<Vec<Event>> {
    let sort = opts.sort;
    let mut rx = all_events_iterator(pool, cap_checker, relays, filter, range, opts, abort).await?;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    if sort {
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    Ok(events)
}

pub(crate) fn build_refined_filter(base: &Filter, since: Option<u64>, until: u64, limit: usize) -> Filter {
    let mut filter = base.clone().until(nostr::Timestamp::from(until)).limit(limit);
    if let Some(since) = since {
        filter = filter.since(nostr::Timestamp::from(since));
    }
    filter
}

fn empty_stream() -> BoundedReceiver<Event> {
    let (tx, rx) = crate::channel::bounded(None);
    tx.close();
    rx
}
