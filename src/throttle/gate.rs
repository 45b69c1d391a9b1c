//! Admission gate trait for abstracting over the limiter tiers.

use async_trait::async_trait;

/// Trait for admission gates.
///
/// This trait abstracts over the individual limiter tiers so the queue can
/// wait on a uniform chain of gates regardless of how each tier is keyed.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Diagnostic name of the gate.
    fn name(&self) -> &str;

    /// Wait until the gate grants one admission slot.
    async fn acquire(&self);
}
