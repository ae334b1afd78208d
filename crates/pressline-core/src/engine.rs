//! The pipeline orchestrator.
//!
//! `Engine` is the central API: create, sync, promote, compare, and
//! delete environments, drive snapshots and the activity journal, and
//! coordinate every external collaborator behind the runtime traits.
//! Each workflow is a fixed sequence of steps reported to an optional
//! progress observer; every workflow that mutates an environment holds
//! its lock for the full duration and releases it on all exit paths.

use crate::clone::{CloneCoordinator, CloneOptions};
use crate::locks::LockManager;
use crate::progress::{report, ProgressObserver};
use crate::CoreError;
use chrono::Utc;
use pressline_runtime::{
    ComposeRuntime, ContainerRuntime, DatabaseServer, FileProxyConfigurator, FileSync,
    GitProvider, MysqlServer, ProxyConfigurator, RsyncFileSync, SourceControlProvider,
};
use pressline_schema::stackenv::{KEY_DB_NAME, KEY_DB_PASSWORD, KEY_DB_USER, KEY_TABLE_PREFIX};
use pressline_schema::{
    validate_env_name, ActivityRecord, ActivityStatus, DbDescriptor, EngineConfig, EnvId, EnvKind,
    EnvStatus, Environment, JobId, JobStatus, PromotionJob, PromotionKind, SnapshotRecord,
    SourceDescriptor, StackDescriptor, StackEnvFile,
};
use pressline_store::{
    ActivityJournal, CleanupReport, EnvironmentStore, JobStore, SnapshotOptions, SnapshotStore,
    StoreError, StoreLayout,
};
use pressline_transform::{SearchReplace, TransformOptions, TransformStats};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// External collaborators the engine drives. Shared handles so tests can
/// keep their mock alive alongside the engine.
#[derive(Clone)]
pub struct Backends {
    pub db: Arc<dyn DatabaseServer>,
    pub stacks: Arc<dyn ContainerRuntime>,
    pub files: Arc<dyn FileSync>,
    pub proxy: Arc<dyn ProxyConfigurator>,
    pub scm: Arc<dyn SourceControlProvider>,
}

impl Backends {
    /// Shell-out implementations for a real host: mysql client tools,
    /// `docker compose`, rsync, file-based proxy configs, git.
    pub fn host(layout: &StoreLayout) -> Self {
        Self {
            db: Arc::new(MysqlServer::new()),
            stacks: Arc::new(ComposeRuntime::new()),
            files: Arc::new(RsyncFileSync::new()),
            proxy: Arc::new(FileProxyConfigurator::new(layout.proxy_dir())),
            scm: Arc::new(GitProvider::new()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Environment name; derived from the production name and kind when
    /// absent (`md-{branch}` for multidevs).
    pub name: Option<String>,
    /// Tracked branch; defaults to the production environment's branch.
    pub branch: Option<String>,
    /// Override for the configured default truncate list.
    pub truncate_tables: Option<Vec<String>>,
    pub skip_files: bool,
}

/// Result of `create_environment`. Late-stage failures degrade instead of
/// aborting; they arrive here as warnings on a running environment.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub environment: Environment,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Snapshot the environment's current database before overwriting it.
    pub snapshot_first: bool,
    pub sync_files: bool,
    /// Extra transformation on top of the automatic domain rewrite.
    pub transform: TransformOptions,
    pub exclude_tables: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            snapshot_first: true,
            sync_files: false,
            transform: TransformOptions::default(),
            exclude_tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub snapshot: Option<pressline_schema::SnapshotId>,
    pub transform: Option<TransformStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteOptions {
    pub snapshot_first: bool,
    /// Mirror `wp-content/uploads` along with the code subpaths.
    pub include_uploads: bool,
    pub flush_cache: bool,
    pub transform: TransformOptions,
    pub exclude_tables: Vec<String>,
}

impl Default for PromoteOptions {
    fn default() -> Self {
        Self {
            snapshot_first: true,
            include_uploads: false,
            flush_cache: true,
            transform: TransformOptions::default(),
            exclude_tables: Vec::new(),
        }
    }
}

/// Combined result of `promote_full`. A failed code promotion stops the
/// sequence, so `database` is `None` in that case. When the database
/// stage errors before its job record exists (a fresh lock conflict,
/// the target vanishing mid-sequence), the code stage has already been
/// applied; the error lands in `database_error` instead of discarding
/// the code job.
#[derive(Debug)]
pub struct FullPromotionReport {
    pub code: PromotionJob,
    pub database: Option<PromotionJob>,
    pub database_error: Option<CoreError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StaleCleanupReport {
    /// Multidevs whose tracked branch no longer exists remotely.
    pub stale: Vec<EnvId>,
    pub deleted: Vec<EnvId>,
    pub errors: Vec<(EnvId, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeDiff {
    pub field: String,
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionDiff {
    pub name: String,
    pub a: Option<String>,
    pub b: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompareReport {
    pub attribute_diffs: Vec<AttributeDiff>,
    /// False when either stack was unreachable; the extension lists are
    /// then empty rather than misleading.
    pub extensions_compared: bool,
    pub extensions_matching: Vec<String>,
    pub extension_diffs: Vec<ExtensionDiff>,
}

pub struct Engine {
    layout: StoreLayout,
    config: EngineConfig,
    environments: EnvironmentStore,
    snapshots: SnapshotStore,
    jobs: JobStore,
    journal: ActivityJournal,
    locks: LockManager,
    backends: Backends,
}

/// Paths mirrored by a code promotion, relative to the file root.
const CODE_SUBPATHS: [&str; 3] = [
    "wp-content/plugins",
    "wp-content/themes",
    "wp-content/mu-plugins",
];
const UPLOADS_SUBPATH: &str = "wp-content/uploads";

fn sync_excludes() -> Vec<String> {
    vec![".git".to_owned(), ".env".to_owned(), "wp-config.php".to_owned()]
}

fn domain_pairs(from: &str, to: &str) -> Vec<SearchReplace> {
    vec![
        SearchReplace::new(format!("https://{from}"), format!("https://{to}")),
        SearchReplace::new(format!("http://{from}"), format!("http://{to}")),
        SearchReplace::new(from, to),
    ]
}

/// Branch names may contain characters environment names must not
/// (`feature/menu` becomes `feature-menu`).
fn sanitize_branch(branch: &str) -> String {
    branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn render_compose(project: &str, http_port: u16) -> String {
    format!(
        r#"services:
  db:
    image: mariadb:11
    restart: unless-stopped
    environment:
      MARIADB_DATABASE: ${{DB_NAME}}
      MARIADB_USER: ${{DB_USER}}
      MARIADB_PASSWORD: ${{DB_PASSWORD}}
      MARIADB_RANDOM_ROOT_PASSWORD: "1"
    volumes:
      - db_data:/var/lib/mysql
  wordpress:
    image: wordpress:latest
    restart: unless-stopped
    depends_on:
      - db
    ports:
      - "{http_port}:80"
    environment:
      WORDPRESS_DB_HOST: db
      WORDPRESS_DB_NAME: ${{DB_NAME}}
      WORDPRESS_DB_USER: ${{DB_USER}}
      WORDPRESS_DB_PASSWORD: ${{DB_PASSWORD}}
      WORDPRESS_TABLE_PREFIX: ${{TABLE_PREFIX}}
volumes:
  db_data:
    name: {project}_db_data
"#
    )
}

fn parse_extension_list(stdout: &str) -> BTreeMap<String, String> {
    let mut extensions = BTreeMap::new();
    for line in stdout.lines() {
        if let Some((name, version)) = line.split_once(',') {
            if name == "name" {
                continue;
            }
            extensions.insert(name.trim().to_owned(), version.trim().to_owned());
        }
    }
    extensions
}

impl Engine {
    pub fn new(
        store_root: impl Into<PathBuf>,
        config: EngineConfig,
        backends: Backends,
    ) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(store_root.into());
        layout.initialize()?;

        let environments = EnvironmentStore::new(layout.clone());
        let locks = LockManager::new(environments.clone(), &config.actor);
        Ok(Self {
            snapshots: SnapshotStore::new(layout.clone()),
            jobs: JobStore::new(layout.clone()),
            journal: ActivityJournal::new(layout.clone()),
            environments,
            locks,
            layout,
            config,
            backends,
        })
    }

    #[inline]
    pub fn store_layout(&self) -> &StoreLayout {
        &self.layout
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn environment(&self, env_id: &str) -> Result<Environment, CoreError> {
        match self.environments.get(env_id) {
            Ok(env) => Ok(env),
            Err(StoreError::EnvNotFound(id)) => Err(CoreError::EnvNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_environments(&self) -> Result<Vec<Environment>, CoreError> {
        Ok(self.environments.list()?)
    }

    pub fn list_jobs(&self) -> Result<Vec<PromotionJob>, CoreError> {
        Ok(self.jobs.list()?)
    }

    pub fn recent_activity(
        &self,
        env_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, CoreError> {
        Ok(self.journal.recent(env_id, limit)?)
    }

    // ------------------------------------------------------------------
    // register / create

    /// Register an existing production site so derived environments can
    /// be created from it. The record must describe a production
    /// environment and its name must be free.
    pub fn register_production(&self, env: &Environment) -> Result<(), CoreError> {
        if !env.is_production() {
            return Err(CoreError::Validation(format!(
                "'{}' is not a production environment record",
                env.env_id
            )));
        }
        if self.environments.exists(env.env_id.as_str()) {
            return Err(CoreError::Validation(format!(
                "environment '{}' already exists",
                env.env_id
            )));
        }
        self.environments.put(env)?;
        self.journal_entry(
            &env.env_id,
            "register",
            "register production environment",
            ActivityStatus::Completed,
            None,
            None,
        );
        info!(env = %env.env_id, "production environment registered");
        Ok(())
    }

    /// Create a derived environment from `production_id`.
    ///
    /// Failures before the container stack starts abort and roll back;
    /// failures after that point (database clone, file copy, proxy
    /// config) are recorded as warnings on a running environment, so an
    /// operator can retry the individual step.
    pub fn create_environment(
        &self,
        production_id: &str,
        kind: EnvKind,
        opts: &CreateOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<CreateOutcome, CoreError> {
        const TOTAL: usize = 8;

        report(observer, 1, TOTAL, "validating request");
        let production = self.environment(production_id)?;
        if !production.is_production() {
            return Err(CoreError::Validation(format!(
                "'{production_id}' is not a production environment"
            )));
        }
        if kind == EnvKind::Production {
            return Err(CoreError::Validation(
                "cannot derive a production environment from another".to_owned(),
            ));
        }
        if kind.is_singleton() && self.environments.kind_exists(production_id, kind)? {
            return Err(CoreError::Validation(format!(
                "a {kind} environment already exists for '{production_id}'"
            )));
        }

        let branch = opts
            .branch
            .clone()
            .unwrap_or_else(|| production.source.branch.clone());
        let name = match &opts.name {
            Some(n) => n.clone(),
            None if kind == EnvKind::Multidev => format!("md-{}", sanitize_branch(&branch)),
            None => format!("{}-{kind}", production.name),
        };
        validate_env_name(&name)?;
        if self.environments.exists(&name) {
            return Err(CoreError::Validation(format!(
                "environment '{name}' already exists"
            )));
        }
        if kind == EnvKind::Multidev {
            let branches = self
                .backends
                .scm
                .list_remote_branches(&production.source.repo_url)?;
            if !branches.iter().any(|b| *b == branch) {
                return Err(CoreError::Validation(format!(
                    "branch '{branch}' does not exist on {}",
                    production.source.repo_url
                )));
            }
        }

        self.journal_entry(
            &EnvId::new(name.clone()),
            "create",
            &format!("create {kind} environment from {}", production.name),
            ActivityStatus::Started,
            None,
            None,
        );
        let started = Instant::now();

        let env = match self.provision(&production, kind, &name, &branch, observer) {
            Ok(env) => env,
            Err(e) => {
                self.rollback_create(&name);
                self.journal_entry(
                    &EnvId::new(name.clone()),
                    "create",
                    "environment creation",
                    ActivityStatus::Failed,
                    Some(elapsed_ms(started)),
                    Some(e.to_string()),
                );
                return Err(e);
            }
        };

        // Past this point the stack is usable: degrade, don't abort.
        let mut warnings = Vec::new();

        report(observer, 5, TOTAL, "waiting for database");
        self.wait_for_database(&env, &mut warnings);

        report(observer, 6, TOTAL, "cloning production database");
        let truncate = opts
            .truncate_tables
            .clone()
            .unwrap_or_else(|| self.config.create.truncate_tables.clone());
        let transform = TransformOptions {
            search_replace: domain_pairs(&production.domain, &env.domain),
            old_prefix: Some(production.database.table_prefix.clone()),
            new_prefix: Some(env.database.table_prefix.clone()),
            truncate_tables: truncate,
            ..Default::default()
        };
        let coordinator =
            CloneCoordinator::new(self.layout.staging_dir(), self.backends.db.as_ref());
        if let Err(e) = coordinator.clone_database(
            &production.database,
            &env.database,
            &CloneOptions {
                transform,
                exclude_tables: Vec::new(),
            },
        ) {
            warnings.push(format!("database clone failed: {e}"));
        }

        report(observer, 7, TOTAL, "deploying site files");
        if !opts.skip_files {
            if let Err(e) = self.deploy_files(&production, &env) {
                warnings.push(format!("file deployment failed: {e}"));
            }
        }

        report(observer, 8, TOTAL, "configuring proxy");
        let http_port = env.stack.as_ref().map_or(80, |s| s.http_port);
        if let Err(e) = self
            .backends
            .proxy
            .create_config(&env.name, &env.domain, http_port, kind)
        {
            warnings.push(format!("proxy configuration failed: {e}"));
        }

        let environment = self.environments.update(&name, |e| {
            e.status = EnvStatus::Running;
        })?;

        for w in &warnings {
            warn!(env = %environment.env_id, "create finished with warning: {w}");
        }
        self.journal_entry(
            &environment.env_id,
            "create",
            "environment creation",
            ActivityStatus::Completed,
            Some(elapsed_ms(started)),
            None,
        );
        info!(env = %environment.env_id, warnings = warnings.len(), "environment created");
        Ok(CreateOutcome {
            environment,
            warnings,
        })
    }

    /// Steps 2-4: stack configuration, environment record, stack start.
    /// Any error here aborts the create.
    fn provision(
        &self,
        production: &Environment,
        kind: EnvKind,
        name: &str,
        branch: &str,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<Environment, CoreError> {
        report(observer, 2, 8, "generating stack configuration");
        let stack_path = self.layout.stack_dir(name);
        fs::create_dir_all(&stack_path)?;

        let db_name = name.replace('-', "_");
        let password = random_token(24);
        let http_port = self.next_http_port()?;

        let mut env_file = StackEnvFile::parse("# managed by pressline\n");
        env_file.set(KEY_DB_NAME, &db_name);
        env_file.set(KEY_DB_USER, &db_name);
        env_file.set(KEY_DB_PASSWORD, &password);
        env_file.set(KEY_TABLE_PREFIX, &production.database.table_prefix);
        let env_file_path = stack_path.join(".env");
        env_file.save(&env_file_path)?;
        fs::write(
            stack_path.join("docker-compose.yml"),
            render_compose(name, http_port),
        )?;

        let stack = StackDescriptor {
            compose_project: name.to_owned(),
            container_prefix: format!("{name}-"),
            path: stack_path.to_string_lossy().into_owned(),
            db_service: "db".to_owned(),
            app_service: "wordpress".to_owned(),
            http_port,
        };

        report(observer, 3, 8, "recording environment");
        let now = Utc::now().to_rfc3339();
        let env = Environment {
            env_id: EnvId::new(name),
            name: name.to_owned(),
            kind,
            production: Some(production.env_id.clone()),
            domain: format!("{name}.{}", self.config.base_domain),
            database: DbDescriptor {
                host: "127.0.0.1".to_owned(),
                port: 3306,
                name: db_name.clone(),
                user: db_name,
                password_ref: format!("{}#{KEY_DB_PASSWORD}", env_file_path.display()),
                table_prefix: production.database.table_prefix.clone(),
            },
            stack: Some(stack),
            lock: None,
            source: SourceDescriptor {
                repo_url: production.source.repo_url.clone(),
                branch: branch.to_owned(),
                deployed_revision: None,
                deployed_at: None,
            },
            file_root: self.layout.files_dir(name).to_string_lossy().into_owned(),
            status: EnvStatus::Deploying,
            app_version: production.app_version.clone(),
            runtime_version: None,
            multisite: production.multisite,
            created_at: now.clone(),
            updated_at: now,
            checksum: None,
        };
        self.environments.put(&env)?;

        report(observer, 4, 8, "starting container stack");
        self.backends.stacks.start_stack(&stack_path)?;
        Ok(env)
    }

    fn rollback_create(&self, name: &str) {
        warn!(env = name, "rolling back failed environment creation");
        let stack_path = self.layout.stack_dir(name);
        if stack_path.exists() {
            if let Err(e) = fs::remove_dir_all(&stack_path) {
                warn!("failed to remove stack directory: {e}");
            }
        }
        if let Err(e) = self.environments.remove(name) {
            warn!("failed to remove environment record: {e}");
        }
    }

    /// Next host port for a new stack: one past the highest port still
    /// bound. A simple record count would hand a deleted environment's
    /// port to the next create while a later stack still holds it.
    fn next_http_port(&self) -> Result<u16, CoreError> {
        let base = self.config.create.base_port;
        let highest = self
            .environments
            .list()?
            .iter()
            .filter_map(|e| e.stack.as_ref().map(|s| s.http_port))
            .max();
        Ok(match highest {
            Some(p) => p.max(base).saturating_add(1),
            None => base.saturating_add(1),
        })
    }

    fn wait_for_database(&self, env: &Environment, warnings: &mut Vec<String>) {
        let create = &self.config.create;
        for attempt in 0..create.db_wait_attempts {
            if self.backends.db.ping(&env.database).is_ok() {
                return;
            }
            if crate::concurrency::shutdown_requested() {
                warnings.push("database wait interrupted by shutdown request".to_owned());
                return;
            }
            if attempt + 1 < create.db_wait_attempts {
                std::thread::sleep(std::time::Duration::from_secs(create.db_wait_interval_secs));
            }
        }
        warnings.push(format!(
            "database did not accept connections after {} attempts",
            create.db_wait_attempts
        ));
    }

    /// Multidevs deploy their tracked branch; other kinds copy the
    /// production file tree.
    fn deploy_files(&self, production: &Environment, env: &Environment) -> Result<(), CoreError> {
        let files_root = PathBuf::from(&env.file_root);
        fs::create_dir_all(&files_root)?;

        if env.kind == EnvKind::Multidev {
            let (sha, subject) = self.backends.scm.deploy_revision(
                &env.source.repo_url,
                &env.source.branch,
                &files_root,
            )?;
            info!(env = %env.env_id, %sha, "deployed branch: {subject}");
            self.environments.update(env.env_id.as_str(), |e| {
                e.source.deployed_revision = Some(sha.clone());
                e.source.deployed_at = Some(Utc::now().to_rfc3339());
            })?;
        } else {
            self.backends.files.copy_tree(
                Path::new(&production.file_root),
                &files_root,
                &sync_excludes(),
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // sync

    /// Overwrite a derived environment's database (and optionally files)
    /// with fresh production content.
    pub fn sync_from_production(
        &self,
        env_id: &str,
        opts: &SyncOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<SyncReport, CoreError> {
        const TOTAL: usize = 3;

        let env = self.environment(env_id)?;
        if env.is_production() {
            return Err(CoreError::Validation(
                "cannot sync into a production environment".to_owned(),
            ));
        }
        let production_id = env.production.clone().ok_or_else(|| {
            CoreError::Validation(format!("'{env_id}' has no production back-reference"))
        })?;
        let production = self.environment(production_id.as_str())?;

        self.journaled(&env.env_id, "sync", "sync from production", || {
            self.locks.with_locks(&[env_id], "sync from production", || {
                report(observer, 1, TOTAL, "snapshotting current database");
                let mut snapshot = None;
                if opts.snapshot_first {
                    let snap = self.snapshots.create(
                        &env,
                        self.backends.db.as_ref(),
                        &SnapshotOptions {
                            name: format!("{} pre-sync", env.name),
                            tag: Some("pre-sync".to_owned()),
                            compress: true,
                            source_revision: env.source.deployed_revision.clone(),
                            ..Default::default()
                        },
                    )?;
                    snapshot = Some(snap.snapshot_id);
                }

                report(observer, 2, TOTAL, "cloning production database");
                let mut transform = opts.transform.clone();
                if production.domain != env.domain {
                    transform
                        .search_replace
                        .extend(domain_pairs(&production.domain, &env.domain));
                }
                if transform.old_prefix.is_none() {
                    transform.old_prefix = Some(production.database.table_prefix.clone());
                    transform.new_prefix = Some(env.database.table_prefix.clone());
                }
                let coordinator =
                    CloneCoordinator::new(self.layout.staging_dir(), self.backends.db.as_ref());
                let clone_report = coordinator.clone_database(
                    &production.database,
                    &env.database,
                    &CloneOptions {
                        transform,
                        exclude_tables: opts.exclude_tables.clone(),
                    },
                )?;

                report(observer, 3, TOTAL, "syncing files");
                if opts.sync_files {
                    self.backends.files.copy_tree(
                        Path::new(&production.file_root),
                        Path::new(&env.file_root),
                        &sync_excludes(),
                    )?;
                }

                Ok(SyncReport {
                    snapshot,
                    transform: clone_report.stats,
                })
            })
        })
    }

    // ------------------------------------------------------------------
    // promotions

    /// Mirror code subpaths from `source_id` into `target_id`.
    ///
    /// Returns the terminal [`PromotionJob`]; `Err` is reserved for
    /// failures before the job starts (validation, lock conflicts).
    pub fn promote_code(
        &self,
        source_id: &str,
        target_id: &str,
        opts: &PromoteOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<PromotionJob, CoreError> {
        if source_id == target_id {
            return Err(CoreError::Validation(
                "source and target must differ".to_owned(),
            ));
        }
        let source = self.environment(source_id)?;
        let target = self.environment(target_id)?;

        let started = Instant::now();
        self.journal_entry(
            &target.env_id,
            "promote-code",
            &format!("code promotion from {}", source.name),
            ActivityStatus::Started,
            None,
            None,
        );

        let job = self
            .locks
            .with_locks(&[source_id, target_id], "code promotion", || {
                let mut job =
                    self.new_job(&source, &target, PromotionKind::Code, serde_json::to_value(opts)?);
                self.jobs.put(&job)?;
                let outcome = self.run_code_promotion(&source, &target, opts, &mut job, observer);
                self.finish_job(&mut job, outcome);
                Ok(job)
            })?;

        self.journal_job_end(&target.env_id, "promote-code", &job, started);
        Ok(job)
    }

    fn run_code_promotion(
        &self,
        source: &Environment,
        target: &Environment,
        opts: &PromoteOptions,
        job: &mut PromotionJob,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<(), CoreError> {
        const TOTAL: usize = 3;

        report(observer, 1, TOTAL, "snapshotting target database");
        if opts.snapshot_first {
            let snap = self.snapshots.create(
                target,
                self.backends.db.as_ref(),
                &SnapshotOptions {
                    name: format!("{} pre-promotion", target.name),
                    tag: Some("pre-promotion".to_owned()),
                    compress: true,
                    source_revision: target.source.deployed_revision.clone(),
                    ..Default::default()
                },
            )?;
            job.snapshot = Some(snap.snapshot_id);
        }

        report(observer, 2, TOTAL, "mirroring code subpaths");
        let mut subpaths: Vec<&str> = CODE_SUBPATHS.to_vec();
        if opts.include_uploads {
            subpaths.push(UPLOADS_SUBPATH);
        }
        let mut mirrored = 0;
        for sub in subpaths {
            let src = Path::new(&source.file_root).join(sub);
            if !src.exists() {
                continue;
            }
            let dst = Path::new(&target.file_root).join(sub);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            self.backends
                .files
                .mirror(&src, &dst, &[".git".to_owned()])?;
            mirrored += 1;
        }
        if mirrored == 0 {
            return Err(CoreError::Validation(format!(
                "no promotable paths found under '{}'",
                source.file_root
            )));
        }

        report(observer, 3, TOTAL, "flushing target cache");
        if opts.flush_cache {
            self.flush_cache(target);
        }
        Ok(())
    }

    fn flush_cache(&self, target: &Environment) {
        let Some(stack) = &target.stack else {
            return;
        };
        let command: Vec<String> = ["wp", "cache", "flush"].map(str::to_owned).to_vec();
        match self
            .backends
            .stacks
            .exec(Path::new(&stack.path), &stack.app_service, &command)
        {
            Ok(out) if out.success => {}
            Ok(_) => warn!(env = %target.env_id, "cache flush reported failure"),
            Err(e) => warn!(env = %target.env_id, "cache flush failed: {e}"),
        }
    }

    /// Clone `source_id`'s database into `target_id` with transformation.
    pub fn promote_database(
        &self,
        source_id: &str,
        target_id: &str,
        opts: &PromoteOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<PromotionJob, CoreError> {
        if source_id == target_id {
            return Err(CoreError::Validation(
                "source and target must differ".to_owned(),
            ));
        }
        let source = self.environment(source_id)?;
        let target = self.environment(target_id)?;

        let started = Instant::now();
        self.journal_entry(
            &target.env_id,
            "promote-database",
            &format!("database promotion from {}", source.name),
            ActivityStatus::Started,
            None,
            None,
        );

        let job = self
            .locks
            .with_locks(&[target_id], "database promotion", || {
                let mut job = self.new_job(
                    &source,
                    &target,
                    PromotionKind::Database,
                    serde_json::to_value(opts)?,
                );
                self.jobs.put(&job)?;
                let outcome =
                    self.run_database_promotion(&source, &target, opts, &mut job, observer);
                self.finish_job(&mut job, outcome);
                Ok(job)
            })?;

        self.journal_job_end(&target.env_id, "promote-database", &job, started);
        Ok(job)
    }

    fn run_database_promotion(
        &self,
        source: &Environment,
        target: &Environment,
        opts: &PromoteOptions,
        job: &mut PromotionJob,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<(), CoreError> {
        const TOTAL: usize = 2;

        report(observer, 1, TOTAL, "snapshotting target database");
        if opts.snapshot_first {
            let snap = self.snapshots.create(
                target,
                self.backends.db.as_ref(),
                &SnapshotOptions {
                    name: format!("{} pre-promotion", target.name),
                    tag: Some("pre-promotion".to_owned()),
                    compress: true,
                    source_revision: target.source.deployed_revision.clone(),
                    ..Default::default()
                },
            )?;
            job.snapshot = Some(snap.snapshot_id);
        }

        report(observer, 2, TOTAL, "cloning database");
        let mut transform = opts.transform.clone();
        if source.domain != target.domain {
            transform
                .search_replace
                .extend(domain_pairs(&source.domain, &target.domain));
        }
        if transform.old_prefix.is_none() {
            transform.old_prefix = Some(source.database.table_prefix.clone());
            transform.new_prefix = Some(target.database.table_prefix.clone());
        }
        let coordinator =
            CloneCoordinator::new(self.layout.staging_dir(), self.backends.db.as_ref());
        coordinator.clone_database(
            &source.database,
            &target.database,
            &CloneOptions {
                transform,
                exclude_tables: opts.exclude_tables.clone(),
            },
        )?;
        Ok(())
    }

    /// Run code promotion, then database promotion.
    ///
    /// A failed code promotion stops the sequence. A database-stage
    /// error that precedes the database job record never discards the
    /// completed code job: it is reported alongside it so the caller
    /// knows code was already promoted.
    pub fn promote_full(
        &self,
        source_id: &str,
        target_id: &str,
        opts: &PromoteOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<FullPromotionReport, CoreError> {
        let code = self.promote_code(source_id, target_id, opts, observer)?;
        if code.status == JobStatus::Failed {
            return Ok(FullPromotionReport {
                code,
                database: None,
                database_error: None,
            });
        }
        match self.promote_database(source_id, target_id, opts, observer) {
            Ok(database) => Ok(FullPromotionReport {
                code,
                database: Some(database),
                database_error: None,
            }),
            Err(e) => {
                warn!(
                    source = source_id,
                    target = target_id,
                    "database stage did not start after code promotion: {e}"
                );
                Ok(FullPromotionReport {
                    code,
                    database: None,
                    database_error: Some(e),
                })
            }
        }
    }

    fn new_job(
        &self,
        source: &Environment,
        target: &Environment,
        kind: PromotionKind,
        options: serde_json::Value,
    ) -> PromotionJob {
        PromotionJob {
            job_id: JobId::new(format!(
                "job-{}-{}",
                Utc::now().format("%Y%m%dT%H%M%S"),
                random_token(6)
            )),
            source: source.env_id.clone(),
            target: target.env_id.clone(),
            kind,
            options,
            status: JobStatus::Running,
            snapshot: None,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            error: None,
            checksum: None,
        }
    }

    /// Set the job's terminal state exactly once and persist it.
    fn finish_job(&self, job: &mut PromotionJob, outcome: Result<(), CoreError>) {
        job.finished_at = Some(Utc::now().to_rfc3339());
        match outcome {
            Ok(()) => job.status = JobStatus::Completed,
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
            }
        }
        if let Err(e) = self.jobs.put(job) {
            warn!(job = %job.job_id, "failed to persist job record: {e}");
        }
    }

    // ------------------------------------------------------------------
    // delete / cleanup

    /// Delete a derived environment and everything it owns.
    ///
    /// Cascade order is an explicit contract: stop stack and volumes,
    /// remove proxy config, delete promotion jobs, delete snapshots,
    /// drop the journal, delete the environment record.
    pub fn delete_environment(&self, env_id: &str) -> Result<(), CoreError> {
        let env = self.environment(env_id)?;
        if env.is_production() {
            return Err(CoreError::Validation(format!(
                "refusing to delete production environment '{env_id}'"
            )));
        }
        if let Some(held) = &env.lock {
            return Err(CoreError::LockConflict {
                env_id: env_id.to_owned(),
                owner: held.locked_by.clone(),
                reason: held.reason.clone(),
            });
        }

        info!(env = env_id, "deleting environment");
        if let Some(stack) = &env.stack {
            self.backends.stacks.stop_stack(Path::new(&stack.path), true)?;
            if let Err(e) = fs::remove_dir_all(&stack.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove stack directory '{}': {e}", stack.path);
                }
            }
        }
        self.backends.proxy.remove_config(&env.name)?;
        self.jobs.remove_for_env(env_id)?;
        self.snapshots.delete_for_env(env_id)?;
        self.journal.remove_env(env_id)?;

        let files_root = PathBuf::from(&env.file_root);
        if files_root.starts_with(self.layout.root()) && files_root.exists() {
            if let Err(e) = fs::remove_dir_all(&files_root) {
                warn!("failed to remove file root '{}': {e}", env.file_root);
            }
        }

        self.environments.remove(env_id)?;
        info!(env = env_id, "environment deleted");
        Ok(())
    }

    /// Delete multidev environments whose tracked branch no longer exists
    /// remotely. With `dry_run` nothing is deleted; the report only lists
    /// what would go. Per-environment errors are collected, never abort
    /// the batch.
    pub fn cleanup_stale_multidevs(
        &self,
        production_id: &str,
        dry_run: bool,
    ) -> Result<StaleCleanupReport, CoreError> {
        let production = self.environment(production_id)?;
        if !production.is_production() {
            return Err(CoreError::Validation(format!(
                "'{production_id}' is not a production environment"
            )));
        }

        let branches = self
            .backends
            .scm
            .list_remote_branches(&production.source.repo_url)?;
        let mut cleanup = StaleCleanupReport::default();

        for env in self.environments.list_children(production_id)? {
            if env.kind != EnvKind::Multidev {
                continue;
            }
            if branches.iter().any(|b| *b == env.source.branch) {
                continue;
            }
            info!(
                env = %env.env_id,
                branch = %env.source.branch,
                "multidev branch no longer exists remotely"
            );
            cleanup.stale.push(env.env_id.clone());
            if dry_run {
                continue;
            }
            match self.delete_environment(env.env_id.as_str()) {
                Ok(()) => cleanup.deleted.push(env.env_id.clone()),
                Err(e) => cleanup.errors.push((env.env_id.clone(), e.to_string())),
            }
        }
        Ok(cleanup)
    }

    // ------------------------------------------------------------------
    // compare

    /// Read-only diff of two environments: basic attributes, and when
    /// both stacks are reachable, installed extension versions.
    pub fn compare_environments(&self, a_id: &str, b_id: &str) -> Result<CompareReport, CoreError> {
        let a = self.environment(a_id)?;
        let b = self.environment(b_id)?;

        let mut compare = CompareReport::default();
        let attrs = [
            ("app_version", display_opt(&a.app_version), display_opt(&b.app_version)),
            (
                "runtime_version",
                display_opt(&a.runtime_version),
                display_opt(&b.runtime_version),
            ),
            (
                "table_prefix",
                a.database.table_prefix.clone(),
                b.database.table_prefix.clone(),
            ),
            ("multisite", a.multisite.to_string(), b.multisite.to_string()),
            ("branch", a.source.branch.clone(), b.source.branch.clone()),
        ];
        for (field, va, vb) in attrs {
            if va != vb {
                compare.attribute_diffs.push(AttributeDiff {
                    field: field.to_owned(),
                    a: va,
                    b: vb,
                });
            }
        }

        if let (Some(ext_a), Some(ext_b)) = (self.extensions(&a), self.extensions(&b)) {
            compare.extensions_compared = true;
            let names: std::collections::BTreeSet<&String> =
                ext_a.keys().chain(ext_b.keys()).collect();
            for name in names {
                match (ext_a.get(name), ext_b.get(name)) {
                    (Some(va), Some(vb)) if va == vb => {
                        compare.extensions_matching.push(name.clone());
                    }
                    (va, vb) => compare.extension_diffs.push(ExtensionDiff {
                        name: name.clone(),
                        a: va.cloned(),
                        b: vb.cloned(),
                    }),
                }
            }
        }
        Ok(compare)
    }

    fn extensions(&self, env: &Environment) -> Option<BTreeMap<String, String>> {
        let stack = env.stack.as_ref()?;
        let command: Vec<String> = ["wp", "plugin", "list", "--format=csv", "--fields=name,version"]
            .map(str::to_owned)
            .to_vec();
        match self
            .backends
            .stacks
            .exec(Path::new(&stack.path), &stack.app_service, &command)
        {
            Ok(out) if out.success => Some(parse_extension_list(&out.stdout)),
            Ok(_) | Err(_) => None,
        }
    }

    // ------------------------------------------------------------------
    // locks / snapshots / journal passthroughs

    pub fn lock_environment(&self, env_id: &str, reason: &str, hours: i64) -> Result<(), CoreError> {
        self.locks
            .lock(env_id, reason, chrono::Duration::hours(hours))
    }

    pub fn unlock_environment(&self, env_id: &str) -> Result<(), CoreError> {
        self.locks.unlock(env_id)
    }

    pub fn create_snapshot(
        &self,
        env_id: &str,
        opts: &SnapshotOptions,
    ) -> Result<SnapshotRecord, CoreError> {
        let env = self.environment(env_id)?;
        self.locks.with_locks(&[env_id], "snapshot creation", || {
            Ok(self
                .snapshots
                .create(&env, self.backends.db.as_ref(), opts)?)
        })
    }

    /// Replace `env_id`'s database with the content of a stored snapshot.
    ///
    /// The snapshot is validated against the environment before the
    /// current database is dropped; a failed import afterwards can leave
    /// the database partially restored, exactly as a failed clone can.
    pub fn restore_snapshot(&self, env_id: &str, snapshot_id: &str) -> Result<(), CoreError> {
        let env = self.environment(env_id)?;
        let record = self.snapshots.get(snapshot_id)?;
        if record.env_id != *env_id {
            return Err(CoreError::Validation(format!(
                "snapshot '{snapshot_id}' belongs to '{}', not '{env_id}'",
                record.env_id
            )));
        }
        self.journaled(&env.env_id, "restore", &format!("restore {snapshot_id}"), || {
            self.locks.with_locks(&[env_id], "snapshot restore", || {
                self.backends.db.drop_database(&env.database)?;
                Ok(self.snapshots.restore(
                    &env,
                    self.backends.db.as_ref(),
                    snapshot_id,
                    true,
                )?)
            })
        })
    }

    pub fn list_snapshots(&self, env_id: Option<&str>) -> Result<Vec<SnapshotRecord>, CoreError> {
        Ok(self.snapshots.list(env_id)?)
    }

    pub fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), CoreError> {
        Ok(self.snapshots.delete(snapshot_id)?)
    }

    /// Retention cleanup with the configured policy.
    pub fn cleanup_snapshots(&self, include_tagged: bool) -> Result<CleanupReport, CoreError> {
        let policy = &self.config.snapshots;
        Ok(self.snapshots.cleanup_old(
            policy.retention_days,
            &policy.protected_tags,
            include_tagged,
        )?)
    }

    // ------------------------------------------------------------------
    // journal plumbing

    fn journal_entry(
        &self,
        env_id: &EnvId,
        action: &str,
        description: &str,
        status: ActivityStatus,
        duration_ms: Option<u64>,
        error: Option<String>,
    ) {
        let record = ActivityRecord {
            env_id: env_id.clone(),
            actor: self.config.actor.clone(),
            action: action.to_owned(),
            description: description.to_owned(),
            status,
            duration_ms,
            error,
            metadata: serde_json::Value::Null,
            recorded_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.journal.append(&record) {
            warn!(env = %env_id, "failed to append journal entry: {e}");
        }
    }

    fn journaled<T>(
        &self,
        env_id: &EnvId,
        action: &str,
        description: &str,
        work: impl FnOnce() -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        self.journal_entry(env_id, action, description, ActivityStatus::Started, None, None);
        let started = Instant::now();
        let result = work();
        match &result {
            Ok(_) => self.journal_entry(
                env_id,
                action,
                description,
                ActivityStatus::Completed,
                Some(elapsed_ms(started)),
                None,
            ),
            Err(e) => self.journal_entry(
                env_id,
                action,
                description,
                ActivityStatus::Failed,
                Some(elapsed_ms(started)),
                Some(e.to_string()),
            ),
        }
        result
    }

    fn journal_job_end(&self, env_id: &EnvId, action: &str, job: &PromotionJob, started: Instant) {
        let (status, error) = match job.status {
            JobStatus::Failed => (ActivityStatus::Failed, job.error.clone()),
            _ => (ActivityStatus::Completed, None),
        };
        self.journal_entry(
            env_id,
            action,
            &format!("job {}", job.job_id),
            status,
            Some(elapsed_ms(started)),
            error,
        );
    }
}

fn display_opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_owned())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
