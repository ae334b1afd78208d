//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings for backward compatibility.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for String {
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Unique environment identifier, derived from the environment name at
    /// creation time and stable for the environment's lifetime.
    EnvId
);

string_newtype!(
    /// Snapshot identifier; doubles as the dump file stem
    /// (`{identifier}_{timestamp}`).
    SnapshotId
);

string_newtype!(
    /// Promotion job identifier.
    JobId
);

/// The deployment role of an environment within a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    Production,
    Staging,
    Development,
    Multidev,
}

impl EnvKind {
    /// Non-multidev kinds exist at most once per production environment.
    pub fn is_singleton(self) -> bool {
        !matches!(self, EnvKind::Multidev)
    }
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvKind::Production => write!(f, "production"),
            EnvKind::Staging => write!(f, "staging"),
            EnvKind::Development => write!(f, "development"),
            EnvKind::Multidev => write!(f, "multidev"),
        }
    }
}

impl FromStr for EnvKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(EnvKind::Production),
            "staging" => Ok(EnvKind::Staging),
            "development" => Ok(EnvKind::Development),
            "multidev" => Ok(EnvKind::Multidev),
            other => Err(SchemaError::InvalidKind(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_id_display_and_as_ref() {
        let id = EnvId::new("site-dev");
        assert_eq!(id.to_string(), "site-dev");
        assert_eq!(id.as_str(), "site-dev");
        assert_eq!(AsRef::<str>::as_ref(&id), "site-dev");
    }

    #[test]
    fn env_id_serde_roundtrip() {
        let id = EnvId::new("site-prod");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"site-prod\"");
        let back: EnvId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn snapshot_id_into_inner() {
        let s = SnapshotId::new("site-dev_20260115T120000");
        assert_eq!(s.into_inner(), "site-dev_20260115T120000");
    }

    #[test]
    fn job_id_equality() {
        let a = JobId::new("same");
        let b = JobId::new("same");
        let c = JobId::new("diff");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn kind_roundtrip() {
        for kind in ["production", "staging", "development", "multidev"] {
            let parsed: EnvKind = kind.parse().unwrap();
            assert_eq!(parsed.to_string(), kind);
        }
    }

    #[test]
    fn invalid_kind_rejected() {
        assert!("prod".parse::<EnvKind>().is_err());
        assert!(String::new().parse::<EnvKind>().is_err());
    }

    #[test]
    fn singleton_kinds() {
        assert!(EnvKind::Production.is_singleton());
        assert!(EnvKind::Staging.is_singleton());
        assert!(EnvKind::Development.is_singleton());
        assert!(!EnvKind::Multidev.is_singleton());
    }
}
