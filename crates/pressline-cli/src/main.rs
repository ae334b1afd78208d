mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_LOCKED, EXIT_STORE_ERROR};
use pressline_core::{install_signal_handler, Backends, Engine};
use pressline_schema::{EngineConfig, EnvKind};
use pressline_store::StoreLayout;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pressline",
    version,
    about = "Environment pipeline and database synchronization engine for content sites"
)]
struct Cli {
    /// Path to the Pressline store directory (overrides the config file).
    #[arg(long)]
    store: Option<String>,

    /// Path to the engine config file.
    #[arg(long, default_value = "~/.config/pressline/pressline.toml")]
    config: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register an existing production site in the store.
    Register {
        /// Environment name (also the record id).
        name: String,
        /// Public domain of the site.
        #[arg(long)]
        domain: String,
        /// Database name.
        #[arg(long)]
        db_name: String,
        /// Database user (defaults to the database name).
        #[arg(long)]
        db_user: Option<String>,
        /// Database host.
        #[arg(long, default_value = "127.0.0.1")]
        db_host: String,
        /// Database port.
        #[arg(long, default_value_t = 3306)]
        db_port: u16,
        /// Where the database password lives (file#KEY reference).
        #[arg(long)]
        password_ref: String,
        /// Table prefix.
        #[arg(long, default_value = "wp_")]
        table_prefix: String,
        /// Git repository URL of the site code.
        #[arg(long)]
        repo: String,
        /// Tracked branch.
        #[arg(long, default_value = "main")]
        branch: String,
        /// Root of the deployed file tree.
        #[arg(long)]
        file_root: String,
    },
    /// Create a derived environment from a production site.
    Create {
        /// Production environment the new one derives from.
        production: String,
        /// Kind of environment to create.
        #[arg(long, value_parser = parse_derived_kind)]
        kind: EnvKind,
        /// Environment name (derived from production name and kind if omitted).
        #[arg(long)]
        name: Option<String>,
        /// Branch to track (multidevs require an existing remote branch).
        #[arg(long)]
        branch: Option<String>,
        /// Logical table names to truncate instead of the configured default.
        #[arg(long = "truncate")]
        truncate: Vec<String>,
        /// Skip deploying site files.
        #[arg(long, default_value_t = false)]
        skip_files: bool,
    },
    /// Overwrite an environment's database with fresh production content.
    Sync {
        /// Environment to sync into.
        env_id: String,
        /// Skip the automatic pre-sync snapshot.
        #[arg(long, default_value_t = false)]
        no_snapshot: bool,
        /// Also copy the production file tree.
        #[arg(long, default_value_t = false)]
        files: bool,
        /// Anonymize user emails and names during the clone.
        #[arg(long, default_value_t = false)]
        anonymize: bool,
        /// Tables excluded from the clone entirely.
        #[arg(long = "exclude-table")]
        exclude_tables: Vec<String>,
    },
    /// Promote code (plugins, themes, mu-plugins) between environments.
    PromoteCode {
        source: String,
        target: String,
        #[command(flatten)]
        opts: PromoteArgs,
    },
    /// Promote the database between environments.
    PromoteDb {
        source: String,
        target: String,
        #[command(flatten)]
        opts: PromoteArgs,
    },
    /// Promote code, then the database.
    Promote {
        source: String,
        target: String,
        #[command(flatten)]
        opts: PromoteArgs,
    },
    /// Delete a derived environment and everything it owns.
    Delete {
        env_id: String,
    },
    /// Delete multidev environments whose remote branch is gone.
    CleanupMultidevs {
        /// Production environment whose multidevs are checked.
        production: String,
        /// Only report what would be deleted.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Diff two environments (attributes and installed extensions).
    Compare {
        a: String,
        b: String,
    },
    /// List all known environments.
    List,
    /// Inspect environment metadata.
    Inspect {
        env_id: String,
    },
    /// Lock an environment against pipeline operations.
    Lock {
        env_id: String,
        /// Why the environment is locked.
        reason: String,
        /// Lock lifetime in hours.
        #[arg(long, default_value_t = pressline_core::locks::WORKFLOW_LOCK_TTL_HOURS)]
        hours: i64,
    },
    /// Release an environment lock.
    Unlock {
        env_id: String,
        /// Release even if another actor holds an unexpired lock.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Manage database snapshots.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
    /// Replace an environment's database with a stored snapshot.
    Restore {
        env_id: String,
        snapshot_id: String,
    },
    /// Show recent activity for an environment.
    Log {
        env_id: String,
        /// Number of entries to show (0 for all).
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum SnapshotCommands {
    /// Snapshot an environment's database.
    Create {
        env_id: String,
        /// Human-readable snapshot name.
        #[arg(long)]
        name: Option<String>,
        /// Safety tag; tagged snapshots survive retention cleanup.
        #[arg(long)]
        tag: Option<String>,
        /// Store the dump uncompressed.
        #[arg(long, default_value_t = false)]
        no_compress: bool,
    },
    /// List snapshots, optionally for one environment.
    List {
        env_id: Option<String>,
    },
    /// Delete a snapshot (dump file first, then metadata).
    Delete {
        snapshot_id: String,
    },
    /// Delete snapshots older than the configured retention window.
    Cleanup {
        /// Also delete tagged snapshots.
        #[arg(long, default_value_t = false)]
        include_tagged: bool,
    },
}

#[derive(Debug, clap::Args)]
struct PromoteArgs {
    /// Skip the automatic pre-promotion snapshot of the target.
    #[arg(long, default_value_t = false)]
    no_snapshot: bool,
    /// Also mirror wp-content/uploads.
    #[arg(long, default_value_t = false)]
    include_uploads: bool,
    /// Skip the cache flush on the target after code promotion.
    #[arg(long, default_value_t = false)]
    no_cache_flush: bool,
    /// Tables excluded from the database stage.
    #[arg(long = "exclude-table")]
    exclude_tables: Vec<String>,
}

impl PromoteArgs {
    fn to_options(&self) -> pressline_core::PromoteOptions {
        pressline_core::PromoteOptions {
            snapshot_first: !self.no_snapshot,
            include_uploads: self.include_uploads,
            flush_cache: !self.no_cache_flush,
            exclude_tables: self.exclude_tables.clone(),
            ..Default::default()
        }
    }
}

fn parse_derived_kind(input: &str) -> Result<EnvKind, String> {
    match input.parse::<EnvKind>() {
        Ok(EnvKind::Production) => Err("cannot create a production environment".to_owned()),
        Ok(kind) => Ok(kind),
        Err(e) => Err(e.to_string()),
    }
}

fn load_config(path: &str, store_flag: Option<&str>) -> Result<EngineConfig, String> {
    let config_path = expand_tilde(path);
    let mut config = if config_path.exists() {
        pressline_schema::parse_config_file(&config_path)
            .map_err(|e| format!("config error: {e}"))?
    } else {
        EngineConfig::default()
    };
    if let Some(store) = store_flag {
        config.store = store.to_owned();
    }
    Ok(config)
}

#[allow(clippy::too_many_lines)]
fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PRESSLINE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    if let Commands::Completions { shell } = &cli.command {
        return commands::completions::run::<Cli>(*shell);
    }

    let config = match load_config(&cli.config, cli.store.as_deref()) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let store_path = expand_tilde(&config.store);
    let layout = StoreLayout::new(&store_path);
    let backends = Backends::host(&layout);
    let engine = match Engine::new(&store_path, config, backends) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: failed to open store: {e}");
            return ExitCode::from(EXIT_STORE_ERROR);
        }
    };
    let json = cli.json;

    let result = match cli.command {
        Commands::Register {
            name,
            domain,
            db_name,
            db_user,
            db_host,
            db_port,
            password_ref,
            table_prefix,
            repo,
            branch,
            file_root,
        } => commands::register::run(
            &engine,
            &commands::register::RegisterArgs {
                name,
                domain,
                db_name,
                db_user,
                db_host,
                db_port,
                password_ref,
                table_prefix,
                repo,
                branch,
                file_root,
            },
            json,
        ),
        Commands::Create {
            production,
            kind,
            name,
            branch,
            truncate,
            skip_files,
        } => commands::create::run(
            &engine,
            &production,
            kind,
            &pressline_core::CreateOptions {
                name,
                branch,
                truncate_tables: (!truncate.is_empty()).then_some(truncate),
                skip_files,
            },
            json,
        ),
        Commands::Sync {
            env_id,
            no_snapshot,
            files,
            anonymize,
            exclude_tables,
        } => commands::sync::run(&engine, &env_id, no_snapshot, files, anonymize, exclude_tables, json),
        Commands::PromoteCode { source, target, opts } => {
            commands::promote::run_code(&engine, &source, &target, &opts.to_options(), json)
        }
        Commands::PromoteDb { source, target, opts } => {
            commands::promote::run_database(&engine, &source, &target, &opts.to_options(), json)
        }
        Commands::Promote { source, target, opts } => {
            commands::promote::run_full(&engine, &source, &target, &opts.to_options(), json)
        }
        Commands::Delete { env_id } => commands::delete::run(&engine, &env_id, json),
        Commands::CleanupMultidevs { production, dry_run } => {
            commands::cleanup_multidevs::run(&engine, &production, dry_run, json)
        }
        Commands::Compare { a, b } => commands::compare::run(&engine, &a, &b, json),
        Commands::List => commands::list::run(&engine, json),
        Commands::Inspect { env_id } => commands::inspect::run(&engine, &env_id, json),
        Commands::Lock { env_id, reason, hours } => {
            commands::lock::run(&engine, &env_id, &reason, hours, json)
        }
        Commands::Unlock { env_id, force } => commands::unlock::run(&engine, &env_id, force, json),
        Commands::Snapshot { command } => match command {
            SnapshotCommands::Create {
                env_id,
                name,
                tag,
                no_compress,
            } => commands::snapshot::run_create(
                &engine,
                &env_id,
                name.as_deref(),
                tag.as_deref(),
                !no_compress,
                json,
            ),
            SnapshotCommands::List { env_id } => {
                commands::snapshot::run_list(&engine, env_id.as_deref(), json)
            }
            SnapshotCommands::Delete { snapshot_id } => {
                commands::snapshot::run_delete(&engine, &snapshot_id, json)
            }
            SnapshotCommands::Cleanup { include_tagged } => {
                commands::snapshot::run_cleanup(&engine, include_tagged, json)
            }
        },
        Commands::Restore { env_id, snapshot_id } => {
            commands::restore::run(&engine, &env_id, &snapshot_id, json)
        }
        Commands::Log { env_id, limit } => commands::log::run(&engine, &env_id, limit, json),
        Commands::Completions { .. } => unreachable!("handled before engine setup"),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("locked:") {
                EXIT_LOCKED
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
