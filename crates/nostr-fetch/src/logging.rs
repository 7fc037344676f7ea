//! `tracing` emission gated by `FetcherOptions::min_log_level` (§6, §4.9).
//!
//! The crate still never installs a subscriber — these macros only decide
//! whether an event is emitted *at all*, before it ever reaches whatever
//! subscriber the caller wired up, so `min_log_level: None` truly silences
//! the crate regardless of the caller's own filter configuration.

/// Gated `tracing::warn!`, per §4.9's *warn* severity.
macro_rules! warn {
    ($($arg:tt)*) => {
        if $crate::options::log_level_enabled($crate::options::LogLevel::Warn) {
            ::tracing::warn!($($arg)*);
        }
    };
}

/// Gated `tracing::debug!`. spec.md's level table (§6) has no tier between
/// `info` and `verbose`, so debug-grade diagnostics (a relay dropped after
/// an error, a CLOSED frame, …) are gated behind `Verbose`.
macro_rules! debug {
    ($($arg:tt)*) => {
        if $crate::options::log_level_enabled($crate::options::LogLevel::Verbose) {
            ::tracing::debug!($($arg)*);
        }
    };
}

pub(crate) use debug;
pub(crate) use warn;
