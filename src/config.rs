//! Ledger configuration

use crate::core::batch::BatchConfig;
use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Settings shared by the ledger and the transaction processor
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// How long a cached balance read stays fresh
    pub cache_ttl: Duration,

    /// History rows returned when the caller asks for `limit == 0`
    pub default_history_limit: usize,

    /// Upper bound on history rows returned by a single query
    pub max_history_limit: usize,

    pub batch: BatchConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            default_history_limit: DEFAULT_HISTORY_LIMIT,
            max_history_limit: MAX_HISTORY_LIMIT,
            batch: BatchConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Resolve a requested history limit against the configured bounds
    pub fn history_limit(&self, requested: usize) -> usize {
        match requested {
            0 => self.default_history_limit,
            n => n.min(self.max_history_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero_uses_default(0, 100)]
    #[case::within_bounds(25, 25)]
    #[case::at_max(1000, 1000)]
    #[case::clamped(5000, 1000)]
    fn test_history_limit(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(LedgerConfig::default().history_limit(requested), expected);
    }
}
