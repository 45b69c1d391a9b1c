//! Tiered admission controller.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::ThrottleConfig;
use crate::error::Result;

use super::gate::AdmissionGate;
use super::limiter::SlidingWindowLimiter;
use super::registry::LimiterRegistry;
use super::target::{TargetKind, Tier};

/// The admission queue wrapping outbound calls to a rate-limited messaging
/// API.
///
/// Each call clears every applicable tier in order (group when the target is
/// a group, then conversation, then global) before the guarded operation
/// runs. All limiter state lives in this instance; independent instances
/// never interact.
pub struct MessageThrottle {
    /// Process-wide limiter shared by all destinations
    global: Arc<SlidingWindowLimiter>,
    /// Per-conversation limiters
    conversations: LimiterRegistry,
    /// Per-group limiters
    groups: LimiterRegistry,
}

impl MessageThrottle {
    /// Create a throttle with the default limits (30/s global, 1/s per
    /// conversation, 20/min per group).
    pub fn new() -> Self {
        Self::from_config(ThrottleConfig::default())
    }

    /// Create a throttle with custom limits.
    ///
    /// Fails if any tier carries a zero capacity or window.
    pub fn with_config(config: ThrottleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: ThrottleConfig) -> Self {
        Self {
            global: Arc::new(SlidingWindowLimiter::new(
                Tier::Global.as_str(),
                config.global.capacity,
                config.global.window(),
            )),
            conversations: LimiterRegistry::new(Tier::Conversation, config.conversation),
            groups: LimiterRegistry::new(Tier::Group, config.group),
        }
    }

    /// Run `operation` once every applicable tier has granted admission.
    ///
    /// The operation is invoked exactly once and its output is returned
    /// unchanged; a failed operation propagates to the caller and its
    /// reserved slots stay consumed (the slots track attempt rate, not
    /// success rate). Waiting in one limiter never blocks callers of
    /// unrelated limiters.
    pub async fn admit<F, Fut, T>(&self, target: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let kind = TargetKind::of(target);
        trace!(target, kind = ?kind, "Admission requested");

        for gate in self.gates(kind, target) {
            gate.acquire().await;
            trace!(target, gate = gate.name(), "Gate cleared");
        }
        debug!(target, "Admission granted");

        operation().await
    }

    /// Resolve the gate chain for a destination, outermost tier first.
    fn gates(&self, kind: TargetKind, target: &str) -> Vec<Arc<dyn AdmissionGate>> {
        kind.tiers()
            .iter()
            .map(|tier| -> Arc<dyn AdmissionGate> {
                match tier {
                    Tier::Group => self.groups.get_or_create(target),
                    Tier::Conversation => self.conversations.get_or_create(target),
                    Tier::Global => Arc::clone(&self.global) as Arc<dyn AdmissionGate>,
                }
            })
            .collect()
    }

    /// Number of conversation limiters created so far.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Number of group limiters created so far.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Default for MessageThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierLimit;
    use futures::future::join_all;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Slack for the millisecond anchor ticks that spread racing callers.
    const TOLERANCE: Duration = Duration::from_millis(100);

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + TOLERANCE,
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    /// Spawn `count` concurrent calls to `target`, recording each operation's
    /// start offset from `origin`.
    fn spawn_calls(
        throttle: &Arc<MessageThrottle>,
        origin: Instant,
        target: &str,
        count: usize,
        starts: &Arc<Mutex<Vec<Duration>>>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..count)
            .map(|_| {
                let throttle = Arc::clone(throttle);
                let starts = Arc::clone(starts);
                let target = target.to_owned();
                tokio::spawn(async move {
                    throttle
                        .admit(&target, || async move {
                            starts.lock().push(origin.elapsed());
                        })
                        .await;
                })
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_concurrent_calls_to_one_conversation_are_spaced() {
        let throttle = Arc::new(MessageThrottle::new());
        let starts = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        let handles = spawn_calls(&throttle, origin, "12345", 5, &starts);
        for joined in join_all(handles).await {
            joined.unwrap();
        }

        let mut starts = starts.lock().clone();
        starts.sort();

        assert_eq!(starts.len(), 5);
        for (i, &start) in starts.iter().enumerate() {
            assert_eq!(start, Duration::from_secs(i as u64));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forty_concurrent_calls_respect_global_window() {
        let throttle = Arc::new(MessageThrottle::new());
        let starts = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        // Distinct conversations so only the global tier is contended.
        let handles: Vec<_> = (0..40)
            .flat_map(|i| spawn_calls(&throttle, origin, &(1000 + i).to_string(), 1, &starts))
            .collect();
        for joined in join_all(handles).await {
            joined.unwrap();
        }

        let mut starts = starts.lock().clone();
        starts.sort();
        assert_eq!(starts.len(), 40);

        // No more than 30 starts within any sliding one-second window.
        for i in 0..starts.len() - 30 {
            let spread = starts[i + 30] - starts[i];
            assert!(spread >= Duration::from_secs(1), "31 starts within {:?}", spread);
        }

        // The final call clears no earlier than one full window after the first.
        assert!(starts[39] >= Duration::from_secs(1));
        assert!(starts[39] < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_window_defers_excess_calls() {
        let throttle = Arc::new(MessageThrottle::new());
        let origin = Instant::now();

        let group_starts = Arc::new(Mutex::new(Vec::new()));
        let chat_starts = Arc::new(Mutex::new(Vec::new()));

        let mut handles = spawn_calls(&throttle, origin, "-500", 25, &group_starts);
        handles.extend(spawn_calls(&throttle, origin, "777", 3, &chat_starts));
        for joined in join_all(handles).await {
            joined.unwrap();
        }

        let mut group_starts = group_starts.lock().clone();
        group_starts.sort();
        assert_eq!(group_starts.len(), 25);

        // The conversation tier paces the first 20 a second apart; the group
        // tier holds the final 5 until the 60-second window admits them.
        for (i, &start) in group_starts.iter().take(20).enumerate() {
            assert_near(start, Duration::from_secs(i as u64));
        }
        for (i, &start) in group_starts.iter().skip(20).enumerate() {
            assert_near(start, Duration::from_secs(60 + i as u64));
        }

        // Interleaved calls to an individual destination are unaffected.
        let mut chat_starts = chat_starts.lock().clone();
        chat_starts.sort();
        for (i, &start) in chat_starts.iter().enumerate() {
            assert_near(start, Duration::from_secs(i as u64));
        }

        assert_eq!(throttle.group_count(), 1);
        assert_eq!(throttle.conversation_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_to_one_conversation_does_not_delay_another() {
        let throttle = Arc::new(MessageThrottle::new());
        let origin = Instant::now();

        let burst_starts = Arc::new(Mutex::new(Vec::new()));
        let single_start = Arc::new(Mutex::new(Vec::new()));

        let mut handles = spawn_calls(&throttle, origin, "111", 5, &burst_starts);
        handles.extend(spawn_calls(&throttle, origin, "222", 1, &single_start));
        for joined in join_all(handles).await {
            joined.unwrap();
        }

        // The burst at "111" spreads over four seconds...
        let burst_last = *burst_starts.lock().iter().max().unwrap();
        assert_near(burst_last, Duration::from_secs(4));

        // ...while "222" goes out immediately.
        assert_near(single_start.lock()[0], Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_result_is_returned_unchanged() {
        let throttle = MessageThrottle::new();

        let value = throttle.admit("42", || async { "delivered" }).await;
        assert_eq!(value, "delivered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_operation_propagates_and_keeps_slot() {
        let throttle = MessageThrottle::new();
        let origin = Instant::now();

        let outcome: std::result::Result<(), &str> =
            throttle.admit("42", || async { Err("boom") }).await;
        assert_eq!(outcome, Err("boom"));

        // The failed call's reservation stays consumed: the next call to the
        // same conversation waits out the full window.
        throttle.admit("42", || async {}).await;
        assert_eq!(origin.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_runs_exactly_once() {
        let throttle = MessageThrottle::new();
        let calls = Arc::new(Mutex::new(0u32));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            throttle.admit("42", || async move { *calls.lock() += 1 }).await;
        }

        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_numeric_target_uses_group_tier() {
        let throttle = MessageThrottle::new();

        throttle.admit("@channelname", || async {}).await;

        assert_eq!(throttle.group_count(), 1);
        assert_eq!(throttle.conversation_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_conversation_capacity() {
        let config = ThrottleConfig {
            conversation: TierLimit::new(2, 1_000),
            ..ThrottleConfig::default()
        };
        let throttle = Arc::new(MessageThrottle::with_config(config).unwrap());
        let starts = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        let handles = spawn_calls(&throttle, origin, "12345", 3, &starts);
        for joined in join_all(handles).await {
            joined.unwrap();
        }

        let mut starts = starts.lock().clone();
        starts.sort();

        // Two fit in the first window; the third waits it out.
        assert!(starts[1] < Duration::from_millis(100));
        assert_near(starts[2], Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let config = ThrottleConfig {
            global: TierLimit::new(0, 1_000),
            ..ThrottleConfig::default()
        };

        assert!(MessageThrottle::with_config(config).is_err());
    }
}
