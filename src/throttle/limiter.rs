//! Sliding-window reservation limiter.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, trace};

use super::gate::AdmissionGate;

/// Smallest increment between two reservations made at effectively the same
/// instant. Anchors advance by at least this much past the newest reservation,
/// so concurrent callers are never assigned the same slot.
const RESERVATION_TICK: Duration = Duration::from_millis(1);

/// A rate limiter that admits at most `capacity` calls within any trailing
/// `window`, handing each caller a reserved future slot.
///
/// Reservations are computed and recorded before the caller sleeps, so
/// concurrent callers each receive a distinct, non-overlapping slot without
/// serializing the sleeps themselves. The internal lock covers only the
/// bookkeeping, never a delay.
pub struct SlidingWindowLimiter {
    /// Diagnostic key, e.g. `conversation:12345`
    name: String,
    /// Maximum admissions per window
    capacity: usize,
    /// Trailing window the capacity is enforced over
    window: Duration,
    /// Reserved slots, oldest first, in bookkeeping arrival order
    reservations: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a new limiter.
    ///
    /// `capacity` and `window` must be positive; the public construction path
    /// ([`ThrottleConfig::validate`](crate::config::ThrottleConfig::validate))
    /// rejects anything else before reaching here.
    pub fn new(name: impl Into<String>, capacity: usize, window: Duration) -> Self {
        debug_assert!(capacity > 0, "limiter capacity must be at least 1");
        debug_assert!(!window.is_zero(), "limiter window must be longer than zero");

        Self {
            name: name.into(),
            capacity,
            window,
            reservations: Mutex::new(VecDeque::new()),
        }
    }

    /// Reserve the next free admission slot and return how long the caller
    /// must wait for it.
    ///
    /// The slot is recorded immediately, before any waiting happens, and is
    /// consumed even if the caller later fails or disappears.
    pub fn reserve(&self) -> Duration {
        let mut reservations = self.reservations.lock();
        let now = Instant::now();

        // Anchor strictly after the newest reservation when callers race at
        // the same instant; otherwise current time.
        let anchor = match reservations.back() {
            Some(&last) if last + RESERVATION_TICK >= now => last + RESERVATION_TICK,
            _ => now,
        };

        let in_window = self.trim_expired(&mut reservations, anchor);

        // When the window is full, the next slot opens the moment the oldest
        // reservation still inside it ages out.
        let slot = match reservations.front() {
            Some(&oldest) if in_window >= self.capacity => oldest + self.window,
            _ => anchor,
        };

        reservations.push_back(slot);
        let wait = slot.duration_since(now);

        trace!(
            limiter = %self.name,
            in_window,
            wait_ms = wait.as_millis() as u64,
            "Reservation recorded"
        );
        if in_window >= self.capacity {
            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Window full, admission deferred"
            );
        }

        wait
    }

    /// Reserve a slot and suspend until it becomes live.
    ///
    /// The limiter's lock is released before sleeping.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Drop reservations that have aged out of the window ending at `anchor`
    /// and return how many remain inside it.
    ///
    /// Anchors only move forward, so a dropped reservation can never count
    /// toward a later decision. Storage is queue-ordered by bookkeeping
    /// arrival, so the scan runs newest to oldest and stops at the first
    /// aged-out entry.
    fn trim_expired(&self, reservations: &mut VecDeque<Instant>, anchor: Instant) -> usize {
        let Some(horizon) = anchor.checked_sub(self.window) else {
            // The window reaches past the start of the clock; nothing has
            // aged out yet.
            return reservations.len();
        };

        let kept = reservations
            .iter()
            .rev()
            .take_while(|&&slot| slot >= horizon)
            .count();
        let expired = reservations.len() - kept;
        reservations.drain(..expired);

        kept
    }

    /// Diagnostic name of this limiter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum admissions per window.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The trailing window the capacity is enforced over.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of reservations currently stored.
    ///
    /// This is primarily useful for testing.
    pub fn reservation_count(&self) -> usize {
        self.reservations.lock().len()
    }
}

#[async_trait]
impl AdmissionGate for SlidingWindowLimiter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) {
        SlidingWindowLimiter::acquire(self).await;
    }
}
