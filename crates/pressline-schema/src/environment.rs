use crate::types::{EnvId, EnvKind};
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// Database connection descriptor for one environment.
///
/// The password is a reference into the stack's `.env` file, never the
/// secret itself; host implementations resolve it at call time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbDescriptor {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password_ref: String,
    pub table_prefix: String,
}

/// Container-stack descriptor. `None` on an [`Environment`] means the
/// environment is not containerized (e.g. an externally hosted production).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackDescriptor {
    pub compose_project: String,
    pub container_prefix: String,
    /// Directory holding the compose descriptor and `.env` file.
    pub path: String,
    pub db_service: String,
    pub app_service: String,
    pub http_port: u16,
}

/// A held per-environment lock. All fields are set together; an unlocked
/// environment carries `None` instead of a partially filled state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockState {
    pub locked_by: String,
    pub reason: String,
    pub acquired_at: String,
    pub expires_at: String,
}

impl LockState {
    /// Advisory expiry check; the lock manager never auto-unlocks on expiry.
    pub fn is_expired(&self, now: &chrono::DateTime<chrono::Utc>) -> bool {
        chrono::DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|exp| exp < *now)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub repo_url: String,
    pub branch: String,
    #[serde(default)]
    pub deployed_revision: Option<String>,
    #[serde(default)]
    pub deployed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvStatus {
    Deploying,
    Running,
    Failed,
}

impl std::fmt::Display for EnvStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvStatus::Deploying => write!(f, "deploying"),
            EnvStatus::Running => write!(f, "running"),
            EnvStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One deployment of the content-site software.
///
/// Production environments never carry a `production` back-reference;
/// every non-production environment always does. [`Environment::validate`]
/// enforces this before a record is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Environment {
    pub env_id: EnvId,
    pub name: String,
    pub kind: EnvKind,
    /// Back-reference to the production environment; `None` only for
    /// production itself.
    #[serde(default)]
    pub production: Option<EnvId>,
    pub domain: String,
    pub database: DbDescriptor,
    #[serde(default)]
    pub stack: Option<StackDescriptor>,
    #[serde(default)]
    pub lock: Option<LockState>,
    pub source: SourceDescriptor,
    /// Root of the deployed site files.
    pub file_root: String,
    pub status: EnvStatus,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub multisite: bool,
    pub created_at: String,
    pub updated_at: String,
    /// blake3 checksum for integrity verification. `None` for legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        self.kind == EnvKind::Production
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Enforce the production back-reference invariant.
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_env_name(&self.name)?;
        match (self.kind, &self.production) {
            (EnvKind::Production, None) => Ok(()),
            (EnvKind::Production, Some(_)) | (_, None) => {
                Err(SchemaError::ProductionInvariant(self.env_id.to_string()))
            }
            (_, Some(_)) => Ok(()),
        }
    }
}

pub fn validate_env_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 64 {
        return Err(SchemaError::InvalidName(
            "environment name must be 1-64 characters".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(SchemaError::InvalidName(
            "environment name must match [a-zA-Z0-9_-]".to_owned(),
        ));
    }
    Ok(())
}
