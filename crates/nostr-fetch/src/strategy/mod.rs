//! Strategy layer (C9): the public fetch methods, layered on C8 (and C3/C4
//! for the per-author variants). All four strategies share the same
//! relay-resolution preamble (§4.7): connect, then filter by required NIPs.

pub(crate) mod all;
pub(crate) mod latest;
pub(crate) mod per_author;

use std::time::Duration;

use crate::capcache::RelayCapChecker;
use crate::options::FetchOptions;
use crate::pool::{EnsureRelaysOpts, RelayPool};
use crate::types::{Event, Filter};
use crate::verify::{DefaultVerifier, Verifier};

/// Presently: `search` in the filter requires NIP-50.
fn required_nips_for(filter: &Filter) -> Vec<u16> {
    if filter.search.is_some() {
        vec![50]
    } else {
        Vec::new()
    }
}

/// Connects to `relays` and drops any that don't carry the NIPs `filter`
/// requires, per §4.7's shared strategy preamble.
pub(crate) async fn resolve_eligible_relays(
    pool: &dyn RelayPool,
    cap_checker: &dyn RelayCapChecker,
    relays: &[String],
    filter: &Filter,
    connect_timeout: Duration,
) -> Vec<String> {
    let connected = pool.ensure_relays(relays, EnsureRelaysOpts { connect_timeout }).await;

    let required = required_nips_for(filter);
    if required.is_empty() {
        return connected;
    }

    let mut eligible = Vec::with_capacity(connected.len());
    for url in connected {
        if cap_checker.relay_supports_nips(&url, &required).await {
            eligible.push(url);
        }
    }
    eligible
}

/// Shared tail of §4.7.2 (and, per §4.7.4, the per-author merger): truncates
/// a `created_at`-descending, already-deduped event list to `n` according to
/// the caller's verification mode.
///
/// - `skip_verification`: events were never verified; emit the first `n` as-is.
/// - `reduce_verification` (default for the latest-N family): the driver
///   skipped verification to avoid wasted work on truncated events; verify
///   here, in sorted order, and emit the first `n` that pass.
/// - neither: the driver already verified every event; emit the first `n`.
pub(crate) fn finalize_sorted(sorted_desc: Vec<Event>, n: usize, opts: &FetchOptions) -> Vec<Event> {
    if opts.skip_verification {
        sorted_desc.into_iter().take(n).collect()
    } else if opts.reduce_verification {
        let verifier = DefaultVerifier;
        sorted_desc.into_iter().filter(|e| verifier.verify(e)).take(n).collect()
    } else {
        sorted_desc.into_iter().take(n).collect()
    }
}
