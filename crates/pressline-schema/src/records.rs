//! Secondary domain records: snapshots, promotion jobs, and activity entries.

use crate::types::{EnvId, JobId, SnapshotId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Completed,
    Failed,
}

/// A stored point-in-time database dump.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub snapshot_id: SnapshotId,
    pub env_id: EnvId,
    pub name: String,
    /// Safety tag, e.g. "pre-promotion". Tagged snapshots are exempt from
    /// retention cleanup unless explicitly overridden.
    #[serde(default)]
    pub tag: Option<String>,
    pub file: String,
    pub size_bytes: u64,
    pub compressed: bool,
    #[serde(default)]
    pub source_revision: Option<String>,
    pub tables: Vec<String>,
    pub row_count: u64,
    pub status: SnapshotStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromotionKind {
    Code,
    Database,
}

impl std::fmt::Display for PromotionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromotionKind::Code => write!(f, "code"),
            PromotionKind::Database => write!(f, "database"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// Record of one code or database promotion attempt.
///
/// References its two environments by id but owns neither; deleting an
/// environment removes the jobs that reference it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromotionJob {
    pub job_id: JobId,
    pub source: EnvId,
    pub target: EnvId,
    pub kind: PromotionKind,
    /// Serialized copy of the options the job ran with.
    pub options: serde_json::Value,
    pub status: JobStatus,
    #[serde(default)]
    pub snapshot: Option<SnapshotId>,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl PromotionJob {
    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::Running
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Started,
    Completed,
    Failed,
}

/// Append-only journal entry. Terminal status and duration arrive as a
/// second appended entry, never by mutating the first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityRecord {
    pub env_id: EnvId,
    pub actor: String,
    pub action: String,
    pub description: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub recorded_at: String,
}
