//! Engine tuning, read from the `[engine]` table of a manifest.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tend_schema::ActiveTags;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wait between cycles when nothing is pending.
    pub idle_timeout_ms: u64,
    /// Wait after a cycle in which planning failed.
    pub error_backoff_ms: u64,
    /// Re-plans of one group within a single cycle before it is left for
    /// the next one.
    pub max_follow_ups: usize,
    /// Reinstall a snapshot artifact whose content changed under an equal
    /// version.
    pub snapshot_forces_update: bool,
    /// Tags active at startup.
    pub tags: ActiveTags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 5_000,
            error_backoff_ms: 30_000,
            max_follow_ups: 8,
            snapshot_forces_update: true,
            tags: ActiveTags::new(),
        }
    }
}

impl EngineConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
