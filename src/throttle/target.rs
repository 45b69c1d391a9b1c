//! Destination classification and tier ordering.

use std::fmt;

/// One level of the admission hierarchy, each with its own capacity, window
/// and key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Per-group limit, keyed by group destination
    Group,
    /// Per-conversation limit, keyed by destination
    Conversation,
    /// Process-wide limit shared by all destinations
    Global,
}

impl Tier {
    /// Short label used in limiter names and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Group => "group",
            Tier::Conversation => "conversation",
            Tier::Global => "global",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a message destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A single conversation with one counterpart
    Individual,
    /// A group or broadcast conversation
    Group,
}

impl TargetKind {
    /// Classify a destination identifier.
    ///
    /// Identifiers that parse as a non-negative integer are individual
    /// conversations; everything else (negative IDs, usernames, channel
    /// handles) is treated as a group or broadcast destination. An identifier
    /// always resolves to one of the two kinds, never to an error.
    pub fn of(target: &str) -> Self {
        match target.parse::<i64>() {
            Ok(id) if id >= 0 => TargetKind::Individual,
            _ => TargetKind::Group,
        }
    }

    /// The tiers that gate a destination of this kind, outermost first.
    ///
    /// Coarser, more contended tiers run before finer ones so a caller held
    /// at a coarse gate does not claim a fine-tier slot it cannot use yet.
    pub fn tiers(&self) -> &'static [Tier] {
        match self {
            TargetKind::Group => &[Tier::Group, Tier::Conversation, Tier::Global],
            TargetKind::Individual => &[Tier::Conversation, Tier::Global],
        }
    }
}
