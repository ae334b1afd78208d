//! Database clone coordinator: export, transform, recreate, import.
//!
//! Usable for same-host and cross-container moves; both sides are plain
//! [`DbDescriptor`]s and all heavy lifting goes through the
//! [`DatabaseServer`] trait. Temporary dump files are always deleted,
//! whatever the outcome.

use crate::CoreError;
use pressline_runtime::{DatabaseServer, DumpOptions};
use pressline_schema::DbDescriptor;
use pressline_transform::{TransformEngine, TransformOptions, TransformStats};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// Line transformation applied between export and import. A no-op
    /// set of options skips the transform pass entirely.
    pub transform: TransformOptions,
    /// Tables omitted from the source export (schema and rows).
    pub exclude_tables: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CloneReport {
    /// `None` when the transform pass was skipped.
    pub stats: Option<TransformStats>,
}

pub struct CloneCoordinator<'a> {
    staging_dir: PathBuf,
    db: &'a dyn DatabaseServer,
}

impl<'a> CloneCoordinator<'a> {
    pub fn new(staging_dir: impl Into<PathBuf>, db: &'a dyn DatabaseServer) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            db,
        }
    }

    /// Move `source`'s database into `target`.
    ///
    /// The target database is dropped and recreated before import;
    /// callers snapshot the target first when rollback matters. An
    /// import failure can leave the target empty (documented limitation,
    /// no compensating transaction).
    pub fn clone_database(
        &self,
        source: &DbDescriptor,
        target: &DbDescriptor,
        opts: &CloneOptions,
    ) -> Result<CloneReport, CoreError> {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let raw = self
            .staging_dir
            .join(format!("clone-{}-{token}.sql", target.name));
        let transformed = self
            .staging_dir
            .join(format!("clone-{}-{token}.transformed.sql", target.name));

        let result = self.run(source, target, opts, &raw, &transformed);
        remove_temp(&raw);
        remove_temp(&transformed);
        result
    }

    fn run(
        &self,
        source: &DbDescriptor,
        target: &DbDescriptor,
        opts: &CloneOptions,
        raw: &Path,
        transformed: &Path,
    ) -> Result<CloneReport, CoreError> {
        info!(
            source = %source.name,
            target = %target.name,
            "cloning database"
        );
        let dump_opts = DumpOptions {
            exclude_tables: opts.exclude_tables.clone(),
        };
        self.db.dump(source, raw, &dump_opts)?;

        let (import_path, stats) = if opts.transform.is_noop() {
            debug!("no transform options set; importing the raw dump");
            (raw, None)
        } else {
            let engine = TransformEngine::new(opts.transform.clone())?;
            let stats = engine.run(raw, transformed)?;
            debug!(
                lines_in = stats.lines_in,
                lines_out = stats.lines_out,
                skipped = stats.skipped_inserts,
                "dump transformed"
            );
            (transformed, Some(stats))
        };

        self.db.drop_database(target)?;
        self.db.create_database(target)?;
        self.db.import(target, import_path)?;

        info!(target = %target.name, "clone finished");
        Ok(CloneReport { stats })
    }
}

fn remove_temp(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("failed to remove temp dump '{}': {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_runtime::MockDatabase;
    use pressline_transform::SearchReplace;

    fn descriptor(name: &str) -> DbDescriptor {
        DbDescriptor {
            host: "127.0.0.1".to_owned(),
            port: 3306,
            name: name.to_owned(),
            user: name.to_owned(),
            password_ref: "secret".to_owned(),
            table_prefix: "wp_".to_owned(),
        }
    }

    fn seeded_db() -> MockDatabase {
        let db = MockDatabase::new();
        db.seed(
            "site_prod",
            &[
                "CREATE TABLE `wp_posts` (`id` INT)",
                "INSERT INTO `wp_posts` VALUES (1, 'https://prod.example/page')",
                "CREATE TABLE `wp_sessions` (`id` INT)",
                "INSERT INTO `wp_sessions` VALUES (1, 'abc')",
            ],
        );
        db
    }

    #[test]
    fn clone_without_transform_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db();
        db.seed("site_dev", &["INSERT INTO `wp_old` VALUES (9)"]);

        let coord = CloneCoordinator::new(dir.path(), &db);
        let report = coord
            .clone_database(
                &descriptor("site_prod"),
                &descriptor("site_dev"),
                &CloneOptions::default(),
            )
            .unwrap();

        assert!(report.stats.is_none());
        let lines = db.lines("site_dev").unwrap();
        assert_eq!(lines.len(), 4, "target was recreated, not appended to");
        assert!(lines.iter().all(|l| !l.contains("wp_old")));
    }

    #[test]
    fn clone_applies_transform() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db();

        let coord = CloneCoordinator::new(dir.path(), &db);
        let opts = CloneOptions {
            transform: TransformOptions {
                search_replace: vec![SearchReplace::new(
                    "https://prod.example",
                    "https://dev.example",
                )],
                old_prefix: Some("wp_".to_owned()),
                new_prefix: Some("wp_".to_owned()),
                truncate_tables: vec!["sessions".to_owned()],
                ..Default::default()
            },
            ..Default::default()
        };
        let report = coord
            .clone_database(&descriptor("site_prod"), &descriptor("site_dev"), &opts)
            .unwrap();

        let stats = report.stats.unwrap();
        assert_eq!(stats.skipped_inserts, 1);

        let lines = db.lines("site_dev").unwrap();
        assert!(lines.iter().any(|l| l.contains("https://dev.example/page")));
        assert!(lines.iter().any(|l| l.contains("CREATE TABLE `wp_sessions`")));
        assert!(!lines.iter().any(|l| l.contains("INSERT INTO `wp_sessions`")));
    }

    #[test]
    fn clone_honors_exclude_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db();

        let coord = CloneCoordinator::new(dir.path(), &db);
        let opts = CloneOptions {
            exclude_tables: vec!["sessions".to_owned()],
            ..Default::default()
        };
        coord
            .clone_database(&descriptor("site_prod"), &descriptor("site_dev"), &opts)
            .unwrap();

        let lines = db.lines("site_dev").unwrap();
        assert!(!lines.iter().any(|l| l.contains("wp_sessions")));
    }

    #[test]
    fn temp_files_removed_even_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db();
        db.fail_next_import();

        let coord = CloneCoordinator::new(dir.path(), &db);
        let result = coord.clone_database(
            &descriptor("site_prod"),
            &descriptor("site_dev"),
            &CloneOptions::default(),
        );
        assert!(result.is_err());

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn table_sets_match_after_clone() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db();

        let coord = CloneCoordinator::new(dir.path(), &db);
        coord
            .clone_database(
                &descriptor("site_prod"),
                &descriptor("site_dev"),
                &CloneOptions::default(),
            )
            .unwrap();

        let source_meta = db.metadata(&descriptor("site_prod")).unwrap();
        let target_meta = db.metadata(&descriptor("site_dev")).unwrap();
        assert_eq!(source_meta.tables, target_meta.tables);
    }
}
