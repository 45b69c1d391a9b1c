//! Lazy per-key limiter registry for one admission tier.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::TierLimit;

use super::limiter::SlidingWindowLimiter;
use super::target::Tier;

/// Maps destination keys to limiters within a single tier, creating each
/// limiter on first reference.
///
/// Creation goes through the map's atomic entry API, so concurrent first
/// touches of one key converge on a single limiter instance. Entries are
/// never evicted; keys correspond to a bounded set of real destinations.
pub struct LimiterRegistry {
    /// The tier this registry serves
    tier: Tier,
    /// Capacity and window applied to every limiter in this tier
    limit: TierLimit,
    /// Limiters indexed by destination key
    limiters: DashMap<String, Arc<SlidingWindowLimiter>>,
}

impl LimiterRegistry {
    /// Create an empty registry for one tier.
    pub fn new(tier: Tier, limit: TierLimit) -> Self {
        Self {
            tier,
            limit,
            limiters: DashMap::new(),
        }
    }

    /// Get the limiter for `key`, creating it on first reference.
    pub fn get_or_create(&self, key: &str) -> Arc<SlidingWindowLimiter> {
        if let Some(limiter) = self.limiters.get(key) {
            return Arc::clone(limiter.value());
        }

        let entry = self.limiters.entry(key.to_owned()).or_insert_with(|| {
            debug!(
                tier = %self.tier,
                key,
                capacity = self.limit.capacity,
                window_ms = self.limit.window_ms,
                "Creating new limiter"
            );
            Arc::new(SlidingWindowLimiter::new(
                format!("{}:{}", self.tier, key),
                self.limit.capacity,
                self.limit.window(),
            ))
        });

        Arc::clone(entry.value())
    }

    /// The tier this registry serves.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Number of limiters created so far.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether any limiter has been created yet.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
