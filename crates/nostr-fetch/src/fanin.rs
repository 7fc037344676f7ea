//! Fan-in orchestrator (C8): runs the pagination loop per relay in
//! parallel, fans results into the bounded channel, and applies the global
//! dedup. Used by the three non-per-author strategies; the per-author
//! strategies (§4.7.4) drive their own relay workers around the event
//! bucket table instead.

use std::sync::{Arc, Mutex as StdMutex};

use hashbrown::HashSet;
use tokio_util::sync::CancellationToken;

use crate::channel::{self, BoundedReceiver};
use crate::logging::debug;
use crate::options::FetchOptions;
use crate::pagination::paginate;
use crate::pool::RelayPool;
use crate::types::{Event, EventId, Filter};

/// One relay's share of a fan-in fetch: its URL, and how to build the
/// refined filter / decide quota exhaustion for its pagination loop.
pub(crate) struct RelayPlan {
    pub url: String,
    pub build_next_filter: Box<dyn FnMut(u64) -> Filter + Send>,
    /// Receives the count of locally-new events delivered this iteration
    /// (§4.7.2's `remainingLimit` decrement); returns whether this relay's
    /// quota is now exhausted.
    pub quota_reached: Box<dyn FnMut(usize) -> bool + Send>,
}

/// Runs every plan's pagination loop concurrently, deduping by event id
/// across relays and forwarding into a freshly created bounded channel.
/// The channel closes once every relay has terminated.
pub(crate) fn fan_in(
    pool: Arc<dyn RelayPool>,
    plans: Vec<RelayPlan>,
    starting_until: u64,
    fetch_opts: FetchOptions,
    abort: CancellationToken,
) -> BoundedReceiver<Event> {
    let relay_count = plans.len().max(1);
    let high_water = fetch_opts
        .enable_backpressure
        .then(|| (fetch_opts.effective_limit_per_req() * relay_count).max(5000));

    let (tx, rx) = channel::bounded(high_water);
    let global_seen: Arc<StdMutex<HashSet<EventId>>> = Arc::new(StdMutex::new(HashSet::new()));
    let mut handles = Vec::with_capacity(plans.len());

    for plan in plans {
        let pool = pool.clone();
        let tx = tx.clone();
        let global_seen = global_seen.clone();
        let fetch_opts = fetch_opts.clone();
        let abort = abort.clone();

        handles.push(tokio::spawn(async move {
            let RelayPlan {
                url,
                mut build_next_filter,
                mut quota_reached,
            } = plan;

            let on_new_event = {
                let tx = tx.clone();
                let global_seen = global_seen.clone();
                move |event: Event| {
                    let is_new = global_seen.lock().unwrap().insert(event.id);
                    if is_new {
                        tx.send(event);
                    }
                }
            };

            let after_iteration = {
                let tx = tx.clone();
                let enable_backpressure = fetch_opts.enable_backpressure;
                move || -> futures_util::future::BoxFuture<'static, ()> {
                    let tx = tx.clone();
                    Box::pin(async move {
                        if enable_backpressure {
                            tx.wait_until_drained().await;
                        }
                    })
                }
            };

            let result = paginate(
                pool.as_ref(),
                &url,
                &fetch_opts,
                &abort,
                starting_until,
                move |until| build_next_filter(until),
                on_new_event,
                move |new_count| quota_reached(new_count),
                after_iteration,
            )
            .await;

            if result.errored {
                debug!(relay = %url, "relay dropped from this fetch after an error");
            }
        }));
    }

    tokio::spawn(async move {
        for handle in handles {
            let _ = handle.await;
        }
        tx.close();
    });

    rx
}
