//! Configuration for the admission tiers.
//!
//! The throttle reads no configuration at call time; the enclosing
//! application chooses capacities and windows once, at construction. The
//! defaults match the flood limits documented by popular chat APIs
//! (Telegram: 30 messages/second overall, 20 messages/minute per group,
//! 1 message/second per conversation).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Admission policy for a single tier: at most `capacity` admissions within
/// any trailing window of `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    /// Maximum admissions per window
    pub capacity: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl TierLimit {
    /// Create a new tier limit.
    pub const fn new(capacity: usize, window_ms: u64) -> Self {
        Self { capacity, window_ms }
    }

    /// The window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn validate(&self, tier: &str) -> Result<()> {
        if self.capacity == 0 {
            return Err(FloodgateError::Config(format!(
                "{} tier: capacity must be at least 1",
                tier
            )));
        }
        if self.window_ms == 0 {
            return Err(FloodgateError::Config(format!(
                "{} tier: window must be longer than zero",
                tier
            )));
        }
        Ok(())
    }
}

/// Limits for all three admission tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Process-wide limit across all destinations
    #[serde(default = "default_global_limit")]
    pub global: TierLimit,

    /// Per-conversation limit
    #[serde(default = "default_conversation_limit")]
    pub conversation: TierLimit,

    /// Per-group limit, applied in addition to the conversation limit for
    /// group and broadcast destinations
    #[serde(default = "default_group_limit")]
    pub group: TierLimit,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global: default_global_limit(),
            conversation: default_conversation_limit(),
            group: default_group_limit(),
        }
    }
}

fn default_global_limit() -> TierLimit {
    TierLimit::new(30, 1_000)
}

fn default_conversation_limit() -> TierLimit {
    TierLimit::new(1, 1_000)
}

fn default_group_limit() -> TierLimit {
    TierLimit::new(20, 60_000)
}

impl ThrottleConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse throttle config: {}", e)))
    }

    /// Check that every tier carries a usable limit.
    ///
    /// Capacity and window contract violations are programming errors and are
    /// rejected here, at construction, rather than surfacing at call time.
    pub fn validate(&self) -> Result<()> {
        self.global.validate("global")?;
        self.conversation.validate("conversation")?;
        self.group.validate("group")
    }
}
