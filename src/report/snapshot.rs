//! Session snapshot written at shutdown

use crate::feed::FeedStatus;
use crate::risk::{ClosedPosition, Position, SessionStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name prefix for snapshots
pub const SNAPSHOT_PREFIX: &str = "session_";

/// Everything the persistence collaborator needs to resume or audit a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub ticks: u64,
    pub opportunities_detected: u64,
    pub admission_refusals: u64,
    pub stats: SessionStats,
    /// OPEN and CLOSING positions; never closed implicitly at shutdown
    pub live_positions: Vec<Position>,
    pub closed_positions: Vec<ClosedPosition>,
    pub feeds: Vec<FeedStatus>,
}

impl SessionSnapshot {
    /// `session_YYYYmmdd_HHMMSS.json`
    pub fn file_name(&self) -> String {
        format!("{}{}.json", SNAPSHOT_PREFIX, self.ended_at.format("%Y%m%d_%H%M%S"))
    }

    /// Write as pretty JSON into `dir`, creating it if needed
    pub fn write_to(&self, dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), live = self.live_positions.len(), "Session snapshot written");
        Ok(path)
    }
}
