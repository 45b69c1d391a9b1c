//! Floodgate - Tiered Rate Limiting for Chat Messaging APIs
//!
//! This crate gates concurrent callers so that outbound calls to a
//! rate-limited messaging API (Telegram-style flood limits) never exceed a
//! set of nested throughput ceilings. Every call clears a group gate (when
//! addressed to a group), a per-conversation gate, and a process-wide global
//! gate before it runs; no caller is ever dropped, and calls to one
//! destination never delay calls to another beyond their shared gates.

pub mod config;
pub mod error;
pub mod throttle;
