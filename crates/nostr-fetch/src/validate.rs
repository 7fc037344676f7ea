//! Input validation (C10): each strategy checks its arguments before any
//! I/O. *Warn*-severity failures log and yield an empty result; *error*
//! severity failures raise a [`FetchError`] (§4.9).

use crate::error::{FetchError, Result};
use crate::logging::warn;
use crate::types::{PublicKey, TimeRange};

/// Warn-severity: an empty relay list still runs, it just never connects to
/// anything. Returns `false` when the caller should short-circuit to an
/// empty result.
pub(crate) fn relays_non_empty(relays: &[String]) -> bool {
    if relays.is_empty() {
        warn!("no relays supplied; returning an empty result");
        false
    } else {
        true
    }
}

/// Error-severity: `since` must not be after `until`.
pub(crate) fn time_range(range: &TimeRange) -> Result<(Option<u64>, u64)> {
    range.validate_and_resolve()
}

/// Error-severity: a non-positive fetch limit can never be satisfied.
pub(crate) fn limit_positive(limit: usize) -> Result<()> {
    if limit == 0 {
        Err(FetchError::NonPositiveLimit)
    } else {
        Ok(())
    }
}

/// Warn-severity: no authors means no per-author work to do.
pub(crate) fn authors_non_empty(authors: &[PublicKey]) -> bool {
    if authors.is_empty() {
        warn!("no authors supplied; returning an empty result");
        false
    } else {
        true
    }
}

/// Warn-severity: a per-author relay mapping where every author has an
/// empty relay list can never produce a result.
pub(crate) fn per_author_relays_non_empty(by_relay: &hashbrown::HashMap<String, Vec<PublicKey>>) -> bool {
    if by_relay.is_empty() {
        warn!("no author has any relays; returning an empty result");
        false
    } else {
        true
    }
}
