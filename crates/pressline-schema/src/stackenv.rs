//! Reader/writer for a stack's `.env` key=value file.
//!
//! The orchestrator owns only the well-known keys (`DB_NAME`, `DB_USER`,
//! `DB_PASSWORD`, `TABLE_PREFIX`); every other line (comments, blank
//! lines, unrelated keys) passes through a rewrite untouched and in its
//! original order.

use crate::SchemaError;
use std::fs;
use std::path::Path;

pub const KEY_DB_NAME: &str = "DB_NAME";
pub const KEY_DB_USER: &str = "DB_USER";
pub const KEY_DB_PASSWORD: &str = "DB_PASSWORD";
pub const KEY_TABLE_PREFIX: &str = "TABLE_PREFIX";

#[derive(Debug, Clone)]
enum Line {
    /// `KEY=value` pair; key matching is exact and case-sensitive.
    Pair { key: String, value: String },
    /// Comment, blank line, or anything that does not parse as a pair.
    Verbatim(String),
}

#[derive(Debug, Clone)]
pub struct StackEnvFile {
    lines: Vec<Line>,
}

impl StackEnvFile {
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|raw| {
                let trimmed = raw.trim_start();
                if trimmed.starts_with('#') || trimmed.is_empty() {
                    return Line::Verbatim(raw.to_owned());
                }
                match raw.split_once('=') {
                    Some((key, value)) if !key.trim().is_empty() => Line::Pair {
                        key: key.trim().to_owned(),
                        value: value.to_owned(),
                    },
                    _ => Line::Verbatim(raw.to_owned()),
                }
            })
            .collect();
        Self { lines }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|l| match l {
            Line::Pair { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn require(&self, key: &str) -> Result<&str, SchemaError> {
        self.get(key)
            .ok_or_else(|| SchemaError::MissingEnvKey(key.to_owned()))
    }

    /// Set a key in place, or append it if absent.
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Pair { key: k, value: v } = line {
                if k == key {
                    *v = value.to_owned();
                    return;
                }
            }
        }
        self.lines.push(Line::Pair {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Pair { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Verbatim(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# stack configuration\nDB_NAME=site_dev\nDB_USER=site_dev\nDB_PASSWORD=secret\nTABLE_PREFIX=wp_\n\nCUSTOM_FLAG=1\n";

    #[test]
    fn get_well_known_keys() {
        let env = StackEnvFile::parse(SAMPLE);
        assert_eq!(env.get(KEY_DB_NAME), Some("site_dev"));
        assert_eq!(env.get(KEY_DB_PASSWORD), Some("secret"));
        assert_eq!(env.get(KEY_TABLE_PREFIX), Some("wp_"));
        assert_eq!(env.get("MISSING"), None);
    }

    #[test]
    fn require_missing_key_fails() {
        let env = StackEnvFile::parse("DB_NAME=x\n");
        assert!(env.require(KEY_DB_NAME).is_ok());
        assert!(env.require(KEY_DB_PASSWORD).is_err());
    }

    #[test]
    fn set_rewrites_only_the_target_key() {
        let mut env = StackEnvFile::parse(SAMPLE);
        env.set(KEY_DB_PASSWORD, "rotated");
        let rendered = env.render();
        assert!(rendered.contains("DB_PASSWORD=rotated"));
        // Unrelated keys and comments survive untouched, in order.
        assert!(rendered.starts_with("# stack configuration\n"));
        assert!(rendered.contains("CUSTOM_FLAG=1"));
        assert!(rendered.contains("DB_NAME=site_dev"));
    }

    #[test]
    fn set_appends_new_key() {
        let mut env = StackEnvFile::parse("DB_NAME=x\n");
        env.set(KEY_TABLE_PREFIX, "wpdev_");
        assert_eq!(env.get(KEY_TABLE_PREFIX), Some("wpdev_"));
        assert!(env.render().ends_with("TABLE_PREFIX=wpdev_\n"));
    }

    #[test]
    fn values_may_contain_equals() {
        let env = StackEnvFile::parse("DB_PASSWORD=a=b=c\n");
        assert_eq!(env.get(KEY_DB_PASSWORD), Some("a=b=c"));
    }

    #[test]
    fn roundtrip_preserves_file() {
        let env = StackEnvFile::parse(SAMPLE);
        assert_eq!(env.render(), SAMPLE);
    }

    #[test]
    fn load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, SAMPLE).unwrap();

        let mut env = StackEnvFile::load(&path).unwrap();
        env.set(KEY_DB_NAME, "renamed");
        env.save(&path).unwrap();

        let back = StackEnvFile::load(&path).unwrap();
        assert_eq!(back.get(KEY_DB_NAME), Some("renamed"));
        assert_eq!(back.get("CUSTOM_FLAG"), Some("1"));
    }
}
