//! Engine configuration file (`pressline.toml`).

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Store root directory; all metadata, snapshots, stacks, and file
    /// roots live under it.
    #[serde(default = "default_store")]
    pub store: String,
    /// Domain suffix for derived environments (`{name}.{base_domain}`).
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    /// Actor name recorded in journal entries and lock ownership.
    #[serde(default = "default_actor")]
    pub actor: String,
    #[serde(default)]
    pub snapshots: SnapshotPolicy,
    #[serde(default)]
    pub create: CreateDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            base_domain: default_base_domain(),
            actor: default_actor(),
            snapshots: SnapshotPolicy::default(),
            create: CreateDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnapshotPolicy {
    /// Snapshots older than this are eligible for retention cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Tags exempt from cleanup unless explicitly overridden. Automatic
    /// cleanup must never silently remove a rollback artifact.
    #[serde(default = "default_protected_tags")]
    pub protected_tags: Vec<String>,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            protected_tags: default_protected_tags(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreateDefaults {
    /// Logical table names truncated when cloning production into a new
    /// environment (scheduler/log tables by default).
    #[serde(default = "default_truncate_tables")]
    pub truncate_tables: Vec<String>,
    /// First HTTP port assigned to a new stack; subsequent stacks count up.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Bounded database-readiness poll after a stack starts.
    #[serde(default = "default_db_wait_attempts")]
    pub db_wait_attempts: u32,
    #[serde(default = "default_db_wait_interval_secs")]
    pub db_wait_interval_secs: u64,
}

impl Default for CreateDefaults {
    fn default() -> Self {
        Self {
            truncate_tables: default_truncate_tables(),
            base_port: default_base_port(),
            db_wait_attempts: default_db_wait_attempts(),
            db_wait_interval_secs: default_db_wait_interval_secs(),
        }
    }
}

fn default_store() -> String {
    "~/.local/share/pressline".to_owned()
}

fn default_base_domain() -> String {
    "sites.local".to_owned()
}

fn default_actor() -> String {
    "pressline".to_owned()
}

fn default_retention_days() -> u32 {
    30
}

fn default_protected_tags() -> Vec<String> {
    vec!["pre-promotion".to_owned(), "pre-deploy".to_owned()]
}

fn default_truncate_tables() -> Vec<String> {
    vec!["cron_events".to_owned(), "action_log".to_owned()]
}

fn default_base_port() -> u16 {
    8100
}

fn default_db_wait_attempts() -> u32 {
    30
}

fn default_db_wait_interval_secs() -> u64 {
    2
}

pub fn parse_config_str(input: &str) -> Result<EngineConfig, SchemaError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<EngineConfig, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.snapshots.retention_days, 30);
        assert!(cfg
            .snapshots
            .protected_tags
            .contains(&"pre-promotion".to_owned()));
    }

    #[test]
    fn partial_config_overrides() {
        let cfg = parse_config_str(
            r#"
store = "/var/lib/pressline"
base_domain = "dev.example"

[snapshots]
retention_days = 7
"#,
        )
        .unwrap();
        assert_eq!(cfg.store, "/var/lib/pressline");
        assert_eq!(cfg.base_domain, "dev.example");
        assert_eq!(cfg.snapshots.retention_days, 7);
        // Untouched sections keep defaults
        assert_eq!(cfg.create.base_port, 8100);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(parse_config_str("definitely_not_a_key = true\n").is_err());
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pressline.toml");
        fs::write(&path, "[create]\nbase_port = 9000\n").unwrap();
        let cfg = parse_config_file(&path).unwrap();
        assert_eq!(cfg.create.base_port, 9000);
    }
}
