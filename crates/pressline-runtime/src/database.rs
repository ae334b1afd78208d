//! Database server driver: export, import, and metadata queries.

use crate::process::{run_checked, LONG_TIMEOUT, SHORT_TIMEOUT};
use crate::RuntimeError;
use pressline_schema::{DbDescriptor, StackEnvFile};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DumpOptions {
    /// Tables omitted entirely from the export (schema and rows).
    pub exclude_tables: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbMetadata {
    pub tables: Vec<String>,
    pub row_count: u64,
}

pub trait DatabaseServer: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap connectivity check, used to poll a freshly started stack.
    fn ping(&self, db: &DbDescriptor) -> Result<(), RuntimeError>;

    fn create_database(&self, db: &DbDescriptor) -> Result<(), RuntimeError>;

    fn drop_database(&self, db: &DbDescriptor) -> Result<(), RuntimeError>;

    /// Write a full schema+data export to `out` as SQL text.
    fn dump(&self, db: &DbDescriptor, out: &Path, opts: &DumpOptions) -> Result<(), RuntimeError>;

    /// Import a SQL text dump. Not transactional; callers snapshot first
    /// when rollback matters.
    fn import(&self, db: &DbDescriptor, dump: &Path) -> Result<(), RuntimeError>;

    fn metadata(&self, db: &DbDescriptor) -> Result<DbMetadata, RuntimeError>;
}

/// Resolve a credentials reference of the form `<env-file>#<KEY>` against
/// the stack's `.env` file. A reference without `#` is taken as the literal
/// password (used by tests and externally managed databases).
pub fn resolve_password(db: &DbDescriptor) -> Result<String, RuntimeError> {
    match db.password_ref.split_once('#') {
        Some((file, key)) => {
            let env = StackEnvFile::load(file)
                .map_err(|e| RuntimeError::CommandFailed(e.to_string()))?;
            env.require(key)
                .map(str::to_owned)
                .map_err(|e| RuntimeError::CommandFailed(e.to_string()))
        }
        None => Ok(db.password_ref.clone()),
    }
}

/// Host implementation shelling out to the mysql client tools.
#[derive(Default)]
pub struct MysqlServer;

impl MysqlServer {
    pub fn new() -> Self {
        Self
    }

    fn client(&self, db: &DbDescriptor, tool: &str) -> Result<Command, RuntimeError> {
        let mut cmd = Command::new(tool);
        cmd.arg("-h")
            .arg(&db.host)
            .arg("-P")
            .arg(db.port.to_string())
            .arg("-u")
            .arg(&db.user)
            .env("MYSQL_PWD", resolve_password(db)?);
        Ok(cmd)
    }
}

impl DatabaseServer for MysqlServer {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn ping(&self, db: &DbDescriptor) -> Result<(), RuntimeError> {
        let mut cmd = self.client(db, "mysqladmin")?;
        cmd.arg("ping");
        run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(())
    }

    fn create_database(&self, db: &DbDescriptor) -> Result<(), RuntimeError> {
        let mut cmd = self.client(db, "mysql")?;
        cmd.arg("-e")
            .arg(format!("CREATE DATABASE IF NOT EXISTS `{}`", db.name));
        run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(())
    }

    fn drop_database(&self, db: &DbDescriptor) -> Result<(), RuntimeError> {
        let mut cmd = self.client(db, "mysql")?;
        cmd.arg("-e")
            .arg(format!("DROP DATABASE IF EXISTS `{}`", db.name));
        run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(())
    }

    fn dump(&self, db: &DbDescriptor, out: &Path, opts: &DumpOptions) -> Result<(), RuntimeError> {
        debug!("dumping {} to {}", db.name, out.display());
        let mut cmd = self.client(db, "mysqldump")?;
        cmd.arg("--single-transaction").arg("--quick");
        for table in &opts.exclude_tables {
            cmd.arg(format!("--ignore-table={}.{}", db.name, table));
        }
        cmd.arg(&db.name);
        cmd.stdout(Stdio::from(File::create(out)?))
            .stderr(Stdio::piped());
        let output = crate::process::run_with_timeout_raw(cmd, LONG_TIMEOUT)?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }
        Ok(())
    }

    fn import(&self, db: &DbDescriptor, dump: &Path) -> Result<(), RuntimeError> {
        debug!("importing {} into {}", dump.display(), db.name);
        let mut cmd = self.client(db, "mysql")?;
        cmd.arg(&db.name);
        cmd.stdin(Stdio::from(File::open(dump)?));
        let output = crate::process::run_with_timeout(cmd, LONG_TIMEOUT)?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }
        Ok(())
    }

    fn metadata(&self, db: &DbDescriptor) -> Result<DbMetadata, RuntimeError> {
        let mut cmd = self.client(db, "mysql")?;
        cmd.arg("-N").arg("-e").arg(format!(
            "SELECT table_name, IFNULL(table_rows, 0) FROM information_schema.tables \
             WHERE table_schema = '{}' ORDER BY table_name",
            db.name
        ));
        let output = run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(parse_metadata(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_metadata(stdout: &str) -> DbMetadata {
    let mut meta = DbMetadata::default();
    for line in stdout.lines() {
        let mut fields = line.split_whitespace();
        let Some(table) = fields.next() else { continue };
        meta.tables.push(table.to_owned());
        meta.row_count += fields
            .next()
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(password_ref: &str) -> DbDescriptor {
        DbDescriptor {
            host: "127.0.0.1".to_owned(),
            port: 3306,
            name: "site".to_owned(),
            user: "site".to_owned(),
            password_ref: password_ref.to_owned(),
            table_prefix: "wp_".to_owned(),
        }
    }

    #[test]
    fn literal_password_ref() {
        let db = descriptor("plain-secret");
        assert_eq!(resolve_password(&db).unwrap(), "plain-secret");
    }

    #[test]
    fn env_file_password_ref() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(&env_path, "DB_PASSWORD=from-file\n").unwrap();
        let db = descriptor(&format!("{}#DB_PASSWORD", env_path.display()));
        assert_eq!(resolve_password(&db).unwrap(), "from-file");
    }

    #[test]
    fn missing_env_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(&env_path, "OTHER=x\n").unwrap();
        let db = descriptor(&format!("{}#DB_PASSWORD", env_path.display()));
        assert!(resolve_password(&db).is_err());
    }

    #[test]
    fn parse_metadata_lines() {
        let meta = parse_metadata("wp_options 120\nwp_posts 4500\nwp_sessions 0\n");
        assert_eq!(meta.tables, vec!["wp_options", "wp_posts", "wp_sessions"]);
        assert_eq!(meta.row_count, 4620);
    }

    #[test]
    fn parse_metadata_empty() {
        let meta = parse_metadata("");
        assert!(meta.tables.is_empty());
        assert_eq!(meta.row_count, 0);
    }
}
