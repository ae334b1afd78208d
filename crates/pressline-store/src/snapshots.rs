//! Point-in-time database snapshots: creation, restore, retention cleanup.
//!
//! Dump files live under one shared directory, named
//! `{env_id}_{timestamp}.sql[.gz]`; metadata records live next to the
//! other checksummed stores under `meta/snapshots`.

use crate::kv;
use crate::layout::StoreLayout;
use crate::StoreError;
use chrono::{DateTime, Duration, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pressline_runtime::{DatabaseServer, DumpOptions};
use pressline_schema::{Environment, SnapshotId, SnapshotRecord, SnapshotStatus};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub name: String,
    /// Safety tag such as "pre-promotion"; tagged snapshots survive
    /// retention cleanup unless the caller overrides.
    pub tag: Option<String>,
    pub compress: bool,
    pub exclude_tables: Vec<String>,
    pub source_revision: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub deleted: Vec<SnapshotId>,
    pub kept_tagged: Vec<SnapshotId>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    layout: StoreLayout,
}

impl SnapshotStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn meta_path(&self, snapshot_id: &str) -> PathBuf {
        self.layout.snapshot_meta_dir().join(snapshot_id)
    }

    /// Export `env`'s database to a new snapshot.
    ///
    /// A failure at any point removes whatever was written so far; a
    /// snapshot either exists completely (dump file plus metadata) or
    /// not at all.
    pub fn create(
        &self,
        env: &Environment,
        db: &dyn DatabaseServer,
        opts: &SnapshotOptions,
    ) -> Result<SnapshotRecord, StoreError> {
        let now = Utc::now();
        let base = format!("{}_{}", env.env_id, now.format("%Y%m%dT%H%M%S"));
        // Timestamps have second granularity; disambiguate back-to-back
        // snapshots of the same environment.
        let mut snapshot_id = base.clone();
        let mut n = 1;
        while self.meta_path(&snapshot_id).exists() {
            n += 1;
            snapshot_id = format!("{base}-{n}");
        }
        let raw = self.layout.staging_dir().join(format!("{snapshot_id}.sql"));

        let dump_opts = DumpOptions {
            exclude_tables: opts.exclude_tables.clone(),
        };
        debug!(env = %env.env_id, snapshot = %snapshot_id, "exporting database");
        if let Err(e) = db.dump(&env.database, &raw, &dump_opts) {
            remove_if_present(&raw);
            return Err(e.into());
        }

        let meta = match db.metadata(&env.database) {
            Ok(m) => m,
            Err(e) => {
                remove_if_present(&raw);
                return Err(e.into());
            }
        };

        let final_path = if opts.compress {
            self.layout
                .snapshots_dir()
                .join(format!("{snapshot_id}.sql.gz"))
        } else {
            self.layout.snapshots_dir().join(format!("{snapshot_id}.sql"))
        };

        let placed = if opts.compress {
            gzip_file(&raw, &final_path).map_err(StoreError::Io)
        } else {
            fs::rename(&raw, &final_path).map_err(StoreError::Io)
        };
        remove_if_present(&raw);
        if let Err(e) = placed {
            remove_if_present(&final_path);
            return Err(e);
        }

        let size_bytes = fs::metadata(&final_path)?.len();
        let record = SnapshotRecord {
            snapshot_id: SnapshotId::new(snapshot_id.clone()),
            env_id: env.env_id.clone(),
            name: if opts.name.is_empty() {
                snapshot_id.clone()
            } else {
                opts.name.clone()
            },
            tag: opts.tag.clone(),
            file: final_path.to_string_lossy().into_owned(),
            size_bytes,
            compressed: opts.compress,
            source_revision: opts.source_revision.clone(),
            tables: meta.tables,
            row_count: meta.row_count,
            status: SnapshotStatus::Completed,
            created_at: now.to_rfc3339(),
            checksum: None,
        };

        let dir = self.layout.snapshot_meta_dir();
        if let Err(e) = kv::write_record(&dir, &self.meta_path(&snapshot_id), &record) {
            remove_if_present(&final_path);
            return Err(e);
        }

        info!(
            env = %env.env_id,
            snapshot = %snapshot_id,
            bytes = size_bytes,
            rows = record.row_count,
            "snapshot created"
        );
        Ok(record)
    }

    /// Import a snapshot back into `env`'s database.
    ///
    /// Optionally creates the database first. The import itself is not
    /// transactional; a failure is surfaced verbatim and may leave a
    /// partial import behind.
    pub fn restore(
        &self,
        env: &Environment,
        db: &dyn DatabaseServer,
        snapshot_id: &str,
        create_db: bool,
    ) -> Result<(), StoreError> {
        let record = self.get(snapshot_id)?;
        let dump = Path::new(&record.file);
        if !dump.exists() {
            return Err(StoreError::SnapshotNotFound(format!(
                "{snapshot_id} (dump file missing: {})",
                record.file
            )));
        }

        if create_db {
            db.create_database(&env.database)?;
        }

        if record.compressed {
            let plain = self
                .layout
                .staging_dir()
                .join(format!("{snapshot_id}.restore.sql"));
            let result = gunzip_file(dump, &plain)
                .map_err(StoreError::Io)
                .and_then(|()| db.import(&env.database, &plain).map_err(Into::into));
            remove_if_present(&plain);
            result?;
        } else {
            db.import(&env.database, dump)?;
        }

        info!(env = %env.env_id, snapshot = %snapshot_id, "snapshot restored");
        Ok(())
    }

    pub fn get(&self, snapshot_id: &str) -> Result<SnapshotRecord, StoreError> {
        let path = self.meta_path(snapshot_id);
        if !path.exists() {
            return Err(StoreError::SnapshotNotFound(snapshot_id.to_owned()));
        }
        kv::read_record(&path, snapshot_id)
    }

    /// All snapshots, or only those of one environment, oldest first.
    pub fn list(&self, env_id: Option<&str>) -> Result<Vec<SnapshotRecord>, StoreError> {
        let mut results = Vec::new();
        for id in kv::list_ids(&self.layout.snapshot_meta_dir())? {
            match self.get(&id) {
                Ok(rec) => {
                    if env_id.is_none_or(|e| rec.env_id == *e) {
                        results.push(rec);
                    }
                }
                Err(e) => {
                    warn!("skipping corrupted snapshot record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    /// Delete the dump file first, then the metadata record, so a crash
    /// in between leaves a record pointing at a missing file rather than
    /// an orphaned file nothing references.
    pub fn delete(&self, snapshot_id: &str) -> Result<(), StoreError> {
        let record = self.get(snapshot_id)?;
        remove_if_present(Path::new(&record.file));
        fs::remove_file(self.meta_path(snapshot_id))?;
        Ok(())
    }

    /// Cascade helper for environment deletion.
    pub fn delete_for_env(&self, env_id: &str) -> Result<usize, StoreError> {
        let snapshots = self.list(Some(env_id))?;
        let count = snapshots.len();
        for snap in snapshots {
            self.delete(snap.snapshot_id.as_str())?;
        }
        Ok(count)
    }

    /// Delete snapshots older than `retention_days`, exempting those
    /// whose tag appears in `protected_tags` unless `include_tagged`.
    pub fn cleanup_old(
        &self,
        retention_days: u32,
        protected_tags: &[String],
        include_tagged: bool,
    ) -> Result<CleanupReport, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let mut report = CleanupReport::default();

        for snap in self.list(None)? {
            let created = match DateTime::parse_from_rfc3339(&snap.created_at) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    warn!(
                        snapshot = %snap.snapshot_id,
                        "unparseable created_at '{}': {e}",
                        snap.created_at
                    );
                    continue;
                }
            };
            if created >= cutoff {
                continue;
            }

            let protected = snap
                .tag
                .as_ref()
                .is_some_and(|t| protected_tags.iter().any(|p| p == t));
            if protected && !include_tagged {
                report.kept_tagged.push(snap.snapshot_id.clone());
                continue;
            }

            self.delete(snap.snapshot_id.as_str())?;
            report.deleted.push(snap.snapshot_id);
        }

        info!(
            deleted = report.deleted.len(),
            kept = report.kept_tagged.len(),
            "snapshot retention cleanup finished"
        );
        Ok(report)
    }
}

fn remove_if_present(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("failed to remove '{}': {e}", path.display());
        }
    }
}

fn gzip_file(src: &Path, dest: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;
    let out = File::create(dest)?;
    let mut encoder = GzEncoder::new(out, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    Ok(())
}

fn gunzip_file(src: &Path, dest: &Path) -> io::Result<()> {
    let input = File::open(src)?;
    let mut decoder = GzDecoder::new(input);
    let mut out = File::create(dest)?;
    io::copy(&mut decoder, &mut out)?;
    out.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_runtime::MockDatabase;
    use pressline_schema::{DbDescriptor, EnvId, EnvKind, EnvStatus, SourceDescriptor};

    fn harness() -> (tempfile::TempDir, SnapshotStore, MockDatabase, Environment) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();

        let db = MockDatabase::new();
        db.seed(
            "site_dev",
            &[
                "CREATE TABLE `wp_posts` (`id` INT)",
                "INSERT INTO `wp_posts` VALUES (1, 'hello')",
                "INSERT INTO `wp_posts` VALUES (2, 'world')",
                "CREATE TABLE `wp_cron_events` (`id` INT)",
                "INSERT INTO `wp_cron_events` VALUES (1, 'tick')",
            ],
        );

        let env = Environment {
            env_id: EnvId::new("site-dev"),
            name: "site-dev".to_owned(),
            kind: EnvKind::Development,
            production: Some(EnvId::new("site-prod")),
            domain: "site-dev.sites.local".to_owned(),
            database: DbDescriptor {
                host: "127.0.0.1".to_owned(),
                port: 3306,
                name: "site_dev".to_owned(),
                user: "site_dev".to_owned(),
                password_ref: "secret".to_owned(),
                table_prefix: "wp_".to_owned(),
            },
            stack: None,
            lock: None,
            source: SourceDescriptor {
                repo_url: "https://git.example/site.git".to_owned(),
                branch: "main".to_owned(),
                deployed_revision: None,
                deployed_at: None,
            },
            file_root: "/srv/site-dev".to_owned(),
            status: EnvStatus::Running,
            app_version: None,
            runtime_version: None,
            multisite: false,
            created_at: "2026-01-01T00:00:00Z".to_owned(),
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
            checksum: None,
        };

        (dir, SnapshotStore::new(layout), db, env)
    }

    #[test]
    fn create_records_metadata() {
        let (_dir, store, db, env) = harness();
        let snap = store
            .create(&env, &db, &SnapshotOptions::default())
            .unwrap();

        assert_eq!(snap.env_id, env.env_id);
        assert_eq!(snap.status, SnapshotStatus::Completed);
        assert_eq!(snap.tables, vec!["wp_posts", "wp_cron_events"]);
        assert_eq!(snap.row_count, 3);
        assert!(!snap.compressed);
        assert!(Path::new(&snap.file).exists());
        assert!(snap.size_bytes > 0);
    }

    #[test]
    fn create_honors_exclude_tables() {
        let (_dir, store, db, env) = harness();
        let opts = SnapshotOptions {
            exclude_tables: vec!["cron_events".to_owned()],
            ..Default::default()
        };
        let snap = store.create(&env, &db, &opts).unwrap();
        let dump = fs::read_to_string(&snap.file).unwrap();
        assert!(dump.contains("wp_posts"));
        assert!(!dump.contains("wp_cron_events"));
    }

    #[test]
    fn failed_create_leaves_no_artifacts() {
        let (_dir, store, db, mut env) = harness();
        env.database.name = "missing_db".to_owned();
        assert!(store.create(&env, &db, &SnapshotOptions::default()).is_err());

        assert!(store.list(None).unwrap().is_empty());
        let leftovers: Vec<_> = fs::read_dir(store.layout.snapshots_dir())
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
        let staging: Vec<_> = fs::read_dir(store.layout.staging_dir()).unwrap().collect();
        assert!(staging.is_empty());
    }

    #[test]
    fn compressed_roundtrip_restores() {
        let (_dir, store, db, env) = harness();
        let opts = SnapshotOptions {
            compress: true,
            ..Default::default()
        };
        let snap = store.create(&env, &db, &opts).unwrap();
        assert!(snap.compressed);
        assert!(snap.file.ends_with(".sql.gz"));

        let before = db.lines("site_dev").unwrap().len();
        store
            .restore(&env, &db, snap.snapshot_id.as_str(), false)
            .unwrap();
        let after = db.lines("site_dev").unwrap().len();
        assert_eq!(after, before * 2, "restore appends the full dump");

        let staging: Vec<_> = fs::read_dir(store.layout.staging_dir()).unwrap().collect();
        assert!(staging.is_empty(), "restore temp files are cleaned up");
    }

    #[test]
    fn restore_can_create_database() {
        let (_dir, store, db, env) = harness();
        let snap = store
            .create(&env, &db, &SnapshotOptions::default())
            .unwrap();

        let mut fresh = env.clone();
        fresh.database.name = "site_dev_copy".to_owned();
        assert!(!db.exists("site_dev_copy"));
        store
            .restore(&fresh, &db, snap.snapshot_id.as_str(), true)
            .unwrap();
        assert_eq!(db.lines("site_dev_copy").unwrap().len(), 5);
    }

    #[test]
    fn restore_failure_cleans_temp_file() {
        let (_dir, store, db, env) = harness();
        let opts = SnapshotOptions {
            compress: true,
            ..Default::default()
        };
        let snap = store.create(&env, &db, &opts).unwrap();

        db.fail_next_import();
        assert!(store
            .restore(&env, &db, snap.snapshot_id.as_str(), false)
            .is_err());
        let staging: Vec<_> = fs::read_dir(store.layout.staging_dir()).unwrap().collect();
        assert!(staging.is_empty());
    }

    #[test]
    fn delete_removes_file_and_record() {
        let (_dir, store, db, env) = harness();
        let snap = store
            .create(&env, &db, &SnapshotOptions::default())
            .unwrap();
        store.delete(snap.snapshot_id.as_str()).unwrap();
        assert!(!Path::new(&snap.file).exists());
        assert!(store.get(snap.snapshot_id.as_str()).is_err());
    }

    #[test]
    fn cleanup_exempts_protected_tags() {
        let (_dir, store, db, env) = harness();
        let tagged = store
            .create(
                &env,
                &db,
                &SnapshotOptions {
                    tag: Some("pre-promotion".to_owned()),
                    ..Default::default()
                },
            )
            .unwrap();
        let plain = store
            .create(&env, &db, &SnapshotOptions::default())
            .unwrap();

        // Backdate both records past the retention window.
        for id in [tagged.snapshot_id.as_str(), plain.snapshot_id.as_str()] {
            let mut rec = store.get(id).unwrap();
            rec.created_at = "2020-01-01T00:00:00+00:00".to_owned();
            kv::write_record(
                &store.layout.snapshot_meta_dir(),
                &store.meta_path(id),
                &rec,
            )
            .unwrap();
        }

        let protected = vec!["pre-promotion".to_owned()];
        let report = store.cleanup_old(30, &protected, false).unwrap();
        assert_eq!(report.deleted, vec![plain.snapshot_id.clone()]);
        assert_eq!(report.kept_tagged, vec![tagged.snapshot_id.clone()]);
        assert!(store.get(tagged.snapshot_id.as_str()).is_ok());

        let report = store.cleanup_old(30, &protected, true).unwrap();
        assert_eq!(report.deleted, vec![tagged.snapshot_id]);
    }

    #[test]
    fn cleanup_keeps_recent_snapshots() {
        let (_dir, store, db, env) = harness();
        let snap = store
            .create(&env, &db, &SnapshotOptions::default())
            .unwrap();
        let report = store.cleanup_old(30, &[], false).unwrap();
        assert!(report.deleted.is_empty());
        assert!(store.get(snap.snapshot_id.as_str()).is_ok());
    }
}
