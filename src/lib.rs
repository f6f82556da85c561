//! zk transaction watcher
//!
//! Tracks zk-layer transactions through their commit and verify milestones,
//! keeps per-token lists of pending L1 deposits, and coalesces the balance
//! refreshes they trigger behind a single debounce timer.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod state;
pub mod tx;
pub mod watch;

#[cfg(test)]
mod test_utils;
