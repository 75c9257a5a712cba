//! Scheduler configuration.
//!
//! Composed into the server configuration and loaded with the `config`
//! crate, so every field has a serde default.

use serde::{Deserialize, Serialize};

/// What to do with a one-shot trigger whose due time passed while the
/// process was down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverduePolicy {
    /// Fire once, immediately after startup.
    #[default]
    FireImmediately,
    /// Mark the trigger terminal without firing it.
    Drop,
}

/// What happens to execution history when its trigger is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRetention {
    /// Keep records; they keep referring to the removed name.
    #[default]
    KeepHistory,
    /// Delete the trigger's records together with the trigger.
    Cascade,
}

/// Tunables for the timer engine and registry.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on actions running at the same time.
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,

    /// Capacity of the engine's control channel.
    #[serde(default = "default_control_channel_capacity")]
    pub control_channel_capacity: usize,

    /// Handling of one-shot triggers that came due during downtime.
    #[serde(default)]
    pub overdue_one_shot: OverduePolicy,

    /// Handling of execution history on trigger removal.
    #[serde(default)]
    pub log_retention: LogRetention,
}

fn default_max_concurrent_dispatches() -> usize {
    16
}

fn default_control_channel_capacity() -> usize {
    64
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: default_max_concurrent_dispatches(),
            control_channel_capacity: default_control_channel_capacity(),
            overdue_one_shot: OverduePolicy::default(),
            log_retention: LogRetention::default(),
        }
    }
}
