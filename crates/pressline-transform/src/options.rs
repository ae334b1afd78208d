use serde::{Deserialize, Serialize};

/// One search/replace pair, applied serialization-safely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchReplace {
    pub search: String,
    pub replace: String,
}

impl SearchReplace {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
        }
    }
}

/// Every option the engine recognizes, with defaults. Unknown options are
/// a compile-time error rather than a silently ignored dictionary key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformOptions {
    /// Applied independently, each following the two-phase
    /// (serialized, then plain) rule.
    #[serde(default)]
    pub search_replace: Vec<SearchReplace>,
    /// Table prefix rewrite; both must be set for a rewrite to happen.
    #[serde(default)]
    pub old_prefix: Option<String>,
    #[serde(default)]
    pub new_prefix: Option<String>,
    /// Logical table names whose INSERT statements are skipped. Resolved
    /// against both the old and the new prefix.
    #[serde(default)]
    pub truncate_tables: Vec<String>,
    #[serde(default)]
    pub anonymize: bool,
    #[serde(default)]
    pub anonymize_names: bool,
    #[serde(default)]
    pub reset_passwords: bool,
}

impl TransformOptions {
    /// True when running the engine would emit the input unchanged, letting
    /// the clone coordinator skip the transform step entirely.
    pub fn is_noop(&self) -> bool {
        let prefix_noop = match (&self.old_prefix, &self.new_prefix) {
            (Some(old), Some(new)) => old == new,
            _ => true,
        };
        self.search_replace.is_empty()
            && prefix_noop
            && self.truncate_tables.is_empty()
            && !self.anonymize
            && !self.anonymize_names
            && !self.reset_passwords
    }
}
