// config.rs - Resource limits for a single run.
//
// Process-wide defaults live in atomics, the same knobs a compiled-in
// Oniguruma exposes through onig_set_*_limit. `MatchConfig::default()`
// snapshots them; builder methods override per engine.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::options::MatchOptions;

pub const INIT_MATCH_STACK_SIZE: usize = 160;
pub const DEFAULT_MATCH_STACK_LIMIT_SIZE: u32 = 1_000_000;
pub const DEFAULT_RETRY_LIMIT_IN_MATCH: u64 = 10_000_000;
pub const DEFAULT_TIME_LIMIT_MSEC: u64 = 0;

/// Dispatched instructions between two budget-hook calls.
pub const CHECK_INTERVAL: u64 = 512;

static MATCH_STACK_LIMIT: AtomicU32 = AtomicU32::new(DEFAULT_MATCH_STACK_LIMIT_SIZE);
static RETRY_LIMIT_IN_MATCH: AtomicU64 = AtomicU64::new(DEFAULT_RETRY_LIMIT_IN_MATCH);
static TIME_LIMIT: AtomicU64 = AtomicU64::new(DEFAULT_TIME_LIMIT_MSEC);

pub fn set_default_match_stack_limit(n: u32) {
    MATCH_STACK_LIMIT.store(n, Ordering::Relaxed);
}
pub fn default_match_stack_limit() -> u32 {
    MATCH_STACK_LIMIT.load(Ordering::Relaxed)
}
pub fn set_default_retry_limit_in_match(n: u64) {
    RETRY_LIMIT_IN_MATCH.store(n, Ordering::Relaxed);
}
pub fn default_retry_limit_in_match() -> u64 {
    RETRY_LIMIT_IN_MATCH.load(Ordering::Relaxed)
}
pub fn set_default_time_limit(msec: u64) {
    TIME_LIMIT.store(msec, Ordering::Relaxed);
}
pub fn default_time_limit() -> u64 {
    TIME_LIMIT.load(Ordering::Relaxed)
}

/// Limits and extra options applied to every run of one engine.
///
/// A limit of `0` means unlimited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchConfig {
    /// Maximum number of backtrack frames alive at once.
    pub match_stack_limit: u32,
    /// Maximum number of failures (backtracks) in one run.
    pub retry_limit_in_match: u64,
    /// Wall-clock budget for one run, checked every `CHECK_INTERVAL` retries.
    pub time_limit: Option<Duration>,
    /// Added to the program's own options.
    pub options: MatchOptions,
}

impl Default for MatchConfig {
    fn default() -> Self {
        let msec = default_time_limit();
        MatchConfig {
            match_stack_limit: default_match_stack_limit(),
            retry_limit_in_match: default_retry_limit_in_match(),
            time_limit: (msec != 0).then(|| Duration::from_millis(msec)),
            options: MatchOptions::empty(),
        }
    }
}

impl MatchConfig {
    pub fn match_stack_limit(mut self, n: u32) -> Self {
        self.match_stack_limit = n;
        self
    }

    pub fn retry_limit_in_match(mut self, n: u64) -> Self {
        self.retry_limit_in_match = n;
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let config = MatchConfig::default()
            .match_stack_limit(64)
            .retry_limit_in_match(0)
            .time_limit(Duration::from_millis(5))
            .options(MatchOptions::FIND_LONGEST);
        assert_eq!(config.match_stack_limit, 64);
        assert_eq!(config.retry_limit_in_match, 0);
        assert_eq!(config.time_limit, Some(Duration::from_millis(5)));
        assert_eq!(config.options, MatchOptions::FIND_LONGEST);
    }

    #[test]
    fn defaults_have_a_finite_stack_limit() {
        assert_ne!(MatchConfig::default().match_stack_limit, 0);
    }
}
