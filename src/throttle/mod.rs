//! Admission control and per-destination rate limiting.

mod gate;
mod limiter;
mod queue;
mod registry;
mod target;

pub use gate::AdmissionGate;
pub use limiter::SlidingWindowLimiter;
pub use queue::MessageThrottle;
pub use registry::LimiterRegistry;
pub use target::{TargetKind, Tier};
