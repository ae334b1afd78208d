//! Deterministic in-memory collaborators for engine tests.
//!
//! `MockDatabase` models a database server as a map of database name to
//! single-line SQL statements, so dump/transform/import pipelines can be
//! exercised end to end against the real filesystem without a server.

use crate::container::{ContainerRuntime, ExecOutput, ServiceState};
use crate::database::{DatabaseServer, DbMetadata, DumpOptions};
use crate::proxy::ProxyConfigurator;
use crate::scm::SourceControlProvider;
use crate::RuntimeError;
use pressline_schema::{DbDescriptor, EnvKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn lock_err<T>(e: std::sync::PoisonError<T>) -> RuntimeError {
    RuntimeError::CommandFailed(format!("mutex poisoned: {e}"))
}

/// Table name of a single-line `CREATE TABLE` / `INSERT INTO` statement.
fn statement_table(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("CREATE TABLE `")
        .or_else(|| line.strip_prefix("INSERT INTO `"))?;
    rest.split('`').next()
}

#[derive(Default)]
pub struct MockStack {
    running: Mutex<HashMap<PathBuf, bool>>,
    exec_responses: Mutex<HashMap<String, String>>,
    fail_next_start: Mutex<bool>,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_start(&self) {
        *self.fail_next_start.lock().expect("mock lock") = true;
    }

    /// Canned response for an exec, keyed by the joined command line.
    pub fn respond_to(&self, command: &str, stdout: &str) {
        self.exec_responses
            .lock()
            .expect("mock lock")
            .insert(command.to_owned(), stdout.to_owned());
    }

    pub fn is_running(&self, path: &Path) -> bool {
        self.running
            .lock()
            .expect("mock lock")
            .get(path)
            .copied()
            .unwrap_or(false)
    }
}

impl ContainerRuntime for MockStack {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn start_stack(&self, path: &Path) -> Result<(), RuntimeError> {
        let mut fail = self.fail_next_start.lock().map_err(lock_err)?;
        if *fail {
            *fail = false;
            return Err(RuntimeError::CommandFailed(
                "mock: stack start failed".to_owned(),
            ));
        }
        self.running
            .lock()
            .map_err(lock_err)?
            .insert(path.to_path_buf(), true);
        Ok(())
    }

    fn stop_stack(&self, path: &Path, _remove_volumes: bool) -> Result<(), RuntimeError> {
        self.running
            .lock()
            .map_err(lock_err)?
            .remove(path);
        Ok(())
    }

    fn exec(
        &self,
        path: &Path,
        _service: &str,
        command: &[String],
    ) -> Result<ExecOutput, RuntimeError> {
        if !self.is_running(path) {
            return Err(RuntimeError::StackNotRunning(
                path.display().to_string(),
            ));
        }
        let key = command.join(" ");
        let stdout = self
            .exec_responses
            .lock()
            .map_err(lock_err)?
            .get(&key)
            .cloned()
            .unwrap_or_default();
        Ok(ExecOutput {
            success: true,
            stdout,
        })
    }

    fn status(&self, path: &Path) -> Result<Vec<ServiceState>, RuntimeError> {
        let running = self.is_running(path);
        Ok(vec![
            ServiceState {
                service: "db".to_owned(),
                running,
            },
            ServiceState {
                service: "wordpress".to_owned(),
                running,
            },
        ])
    }
}

#[derive(Default)]
pub struct MockDatabase {
    databases: Mutex<BTreeMap<String, Vec<String>>>,
    fail_next_import: Mutex<bool>,
    fail_ping: Mutex<bool>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, name: &str, lines: &[&str]) {
        self.databases.lock().expect("mock lock").insert(
            name.to_owned(),
            lines.iter().map(|l| (*l).to_owned()).collect(),
        );
    }

    pub fn lines(&self, name: &str) -> Option<Vec<String>> {
        self.databases.lock().expect("mock lock").get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.databases.lock().expect("mock lock").contains_key(name)
    }

    pub fn fail_next_import(&self) {
        *self.fail_next_import.lock().expect("mock lock") = true;
    }

    pub fn fail_ping(&self, fail: bool) {
        *self.fail_ping.lock().expect("mock lock") = fail;
    }
}

impl DatabaseServer for MockDatabase {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn ping(&self, _db: &DbDescriptor) -> Result<(), RuntimeError> {
        if *self.fail_ping.lock().map_err(lock_err)? {
            return Err(RuntimeError::CommandFailed("mock: ping failed".to_owned()));
        }
        Ok(())
    }

    fn create_database(&self, db: &DbDescriptor) -> Result<(), RuntimeError> {
        self.databases
            .lock()
            .map_err(lock_err)?
            .entry(db.name.clone())
            .or_default();
        Ok(())
    }

    fn drop_database(&self, db: &DbDescriptor) -> Result<(), RuntimeError> {
        self.databases.lock().map_err(lock_err)?.remove(&db.name);
        Ok(())
    }

    fn dump(&self, db: &DbDescriptor, out: &Path, opts: &DumpOptions) -> Result<(), RuntimeError> {
        let databases = self.databases.lock().map_err(lock_err)?;
        let lines = databases
            .get(&db.name)
            .ok_or_else(|| RuntimeError::DatabaseNotFound(db.name.clone()))?;

        let mut dump = String::new();
        for line in lines {
            if let Some(table) = statement_table(line) {
                let logical = table.strip_prefix(db.table_prefix.as_str()).unwrap_or(table);
                if opts
                    .exclude_tables
                    .iter()
                    .any(|t| t == table || t == logical)
                {
                    continue;
                }
            }
            dump.push_str(line);
            dump.push('\n');
        }
        fs::write(out, dump)?;
        Ok(())
    }

    fn import(&self, db: &DbDescriptor, dump: &Path) -> Result<(), RuntimeError> {
        let mut fail = self.fail_next_import.lock().map_err(lock_err)?;
        if *fail {
            *fail = false;
            return Err(RuntimeError::CommandFailed(
                "mock: import failed".to_owned(),
            ));
        }
        drop(fail);

        let content = fs::read_to_string(dump)?;
        let mut databases = self.databases.lock().map_err(lock_err)?;
        let target = databases
            .get_mut(&db.name)
            .ok_or_else(|| RuntimeError::DatabaseNotFound(db.name.clone()))?;
        target.extend(content.lines().map(str::to_owned));
        Ok(())
    }

    fn metadata(&self, db: &DbDescriptor) -> Result<DbMetadata, RuntimeError> {
        let databases = self.databases.lock().map_err(lock_err)?;
        let lines = databases
            .get(&db.name)
            .ok_or_else(|| RuntimeError::DatabaseNotFound(db.name.clone()))?;

        let mut meta = DbMetadata::default();
        for line in lines {
            if let Some(table) = statement_table(line) {
                if line.starts_with("CREATE TABLE") {
                    meta.tables.push(table.to_owned());
                } else {
                    meta.row_count += 1;
                }
            }
        }
        Ok(meta)
    }
}

#[derive(Default)]
pub struct MockProxy {
    configs: Mutex<BTreeMap<String, (String, u16)>>,
    fail_next_create: Mutex<bool>,
}

impl MockProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self) {
        *self.fail_next_create.lock().expect("mock lock") = true;
    }

    pub fn has_config(&self, site_name: &str) -> bool {
        self.configs
            .lock()
            .expect("mock lock")
            .contains_key(site_name)
    }
}

impl ProxyConfigurator for MockProxy {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_config(
        &self,
        site_name: &str,
        domain: &str,
        upstream_port: u16,
        _kind: EnvKind,
    ) -> Result<(), RuntimeError> {
        let mut fail = self.fail_next_create.lock().map_err(lock_err)?;
        if *fail {
            *fail = false;
            return Err(RuntimeError::ProxyFailed(
                "mock: proxy config failed".to_owned(),
            ));
        }
        drop(fail);
        self.configs
            .lock()
            .map_err(lock_err)?
            .insert(site_name.to_owned(), (domain.to_owned(), upstream_port));
        Ok(())
    }

    fn remove_config(&self, site_name: &str) -> Result<(), RuntimeError> {
        self.configs.lock().map_err(lock_err)?.remove(site_name);
        Ok(())
    }
}

pub struct MockScm {
    branches: Mutex<Vec<String>>,
}

impl Default for MockScm {
    fn default() -> Self {
        Self {
            branches: Mutex::new(vec!["main".to_owned()]),
        }
    }
}

impl MockScm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_branches(&self, branches: &[&str]) {
        *self.branches.lock().expect("mock lock") =
            branches.iter().map(|b| (*b).to_owned()).collect();
    }
}

impl SourceControlProvider for MockScm {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn list_remote_branches(&self, _repo_url: &str) -> Result<Vec<String>, RuntimeError> {
        Ok(self.branches.lock().map_err(lock_err)?.clone())
    }

    fn deploy_revision(
        &self,
        _repo_url: &str,
        reference: &str,
        _worktree: &Path,
    ) -> Result<(String, String), RuntimeError> {
        let branches = self.branches.lock().map_err(lock_err)?;
        if !branches.iter().any(|b| b == reference) {
            return Err(RuntimeError::ScmFailed(format!(
                "unknown reference '{reference}'"
            )));
        }
        Ok((
            format!("{:0<40}", format!("sha-{reference}")),
            format!("deploy {reference}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(name: &str) -> DbDescriptor {
        DbDescriptor {
            host: "127.0.0.1".to_owned(),
            port: 3306,
            name: name.to_owned(),
            user: name.to_owned(),
            password_ref: "x".to_owned(),
            table_prefix: "wp_".to_owned(),
        }
    }

    #[test]
    fn stack_lifecycle() {
        let stack = MockStack::new();
        let path = Path::new("/tmp/stack");
        assert!(!stack.is_running(path));
        stack.start_stack(path).unwrap();
        assert!(stack.is_running(path));
        assert!(stack.status(path).unwrap().iter().all(|s| s.running));
        stack.stop_stack(path, true).unwrap();
        assert!(!stack.is_running(path));
    }

    #[test]
    fn stack_start_failure_injection() {
        let stack = MockStack::new();
        stack.fail_next_start();
        assert!(stack.start_stack(Path::new("/tmp/s")).is_err());
        // Only fails once
        assert!(stack.start_stack(Path::new("/tmp/s")).is_ok());
    }

    #[test]
    fn exec_requires_running_stack() {
        let stack = MockStack::new();
        let path = Path::new("/tmp/stack");
        assert!(stack.exec(path, "db", &["ls".to_owned()]).is_err());
        stack.start_stack(path).unwrap();
        stack.respond_to("wp plugin list", "seo 1.2\n");
        let out = stack
            .exec(path, "wordpress", &["wp".to_owned(), "plugin".to_owned(), "list".to_owned()])
            .unwrap();
        assert_eq!(out.stdout, "seo 1.2\n");
    }

    #[test]
    fn database_dump_excludes_tables() {
        let mock = MockDatabase::new();
        mock.seed(
            "prod",
            &[
                "CREATE TABLE `wp_posts` (`ID` bigint);",
                "INSERT INTO `wp_posts` VALUES (1,'a');",
                "CREATE TABLE `wp_cache` (`k` text);",
                "INSERT INTO `wp_cache` VALUES ('x');",
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dump.sql");
        mock.dump(
            &db("prod"),
            &out,
            &DumpOptions {
                exclude_tables: vec!["cache".to_owned()],
            },
        )
        .unwrap();
        let dump = fs::read_to_string(&out).unwrap();
        assert!(dump.contains("wp_posts"));
        assert!(!dump.contains("wp_cache"));
    }

    #[test]
    fn database_import_appends_statements() {
        let mock = MockDatabase::new();
        mock.seed("target", &[]);
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("in.sql");
        fs::write(&dump, "CREATE TABLE `wp_x` (`id` int);\n").unwrap();
        mock.import(&db("target"), &dump).unwrap();
        assert_eq!(
            mock.lines("target").unwrap(),
            vec!["CREATE TABLE `wp_x` (`id` int);"]
        );
    }

    #[test]
    fn database_metadata_counts() {
        let mock = MockDatabase::new();
        mock.seed(
            "prod",
            &[
                "CREATE TABLE `wp_posts` (`ID` bigint);",
                "INSERT INTO `wp_posts` VALUES (1,'a');",
                "INSERT INTO `wp_posts` VALUES (2,'b');",
            ],
        );
        let meta = mock.metadata(&db("prod")).unwrap();
        assert_eq!(meta.tables, vec!["wp_posts"]);
        assert_eq!(meta.row_count, 2);
    }

    #[test]
    fn database_drop_then_dump_fails() {
        let mock = MockDatabase::new();
        mock.seed("prod", &[]);
        mock.drop_database(&db("prod")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(mock
            .dump(&db("prod"), &dir.path().join("d.sql"), &DumpOptions::default())
            .is_err());
    }

    #[test]
    fn proxy_config_roundtrip() {
        let proxy = MockProxy::new();
        proxy
            .create_config("site-dev", "site-dev.local", 8101, EnvKind::Development)
            .unwrap();
        assert!(proxy.has_config("site-dev"));
        proxy.remove_config("site-dev").unwrap();
        assert!(!proxy.has_config("site-dev"));
    }

    #[test]
    fn scm_branches_and_deploys() {
        let scm = MockScm::new();
        scm.set_branches(&["main", "feature-x"]);
        assert_eq!(
            scm.list_remote_branches("any").unwrap(),
            vec!["main", "feature-x"]
        );
        let (sha, msg) = scm
            .deploy_revision("any", "feature-x", Path::new("/tmp/wt"))
            .unwrap();
        assert_eq!(sha.len(), 40);
        assert!(msg.contains("feature-x"));
        assert!(scm
            .deploy_revision("any", "gone", Path::new("/tmp/wt"))
            .is_err());
    }
}
