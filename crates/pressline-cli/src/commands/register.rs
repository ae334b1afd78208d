use super::{core_err, json_pretty, EXIT_SUCCESS};
use chrono::Utc;
use pressline_core::Engine;
use pressline_schema::{
    DbDescriptor, EnvId, EnvKind, EnvStatus, Environment, SourceDescriptor,
};

pub struct RegisterArgs {
    pub name: String,
    pub domain: String,
    pub db_name: String,
    pub db_user: Option<String>,
    pub db_host: String,
    pub db_port: u16,
    pub password_ref: String,
    pub table_prefix: String,
    pub repo: String,
    pub branch: String,
    pub file_root: String,
}

pub fn run(engine: &Engine, args: &RegisterArgs, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let now = Utc::now().to_rfc3339();
    let env = Environment {
        env_id: EnvId::new(&args.name),
        name: args.name.clone(),
        kind: EnvKind::Production,
        production: None,
        domain: args.domain.clone(),
        database: DbDescriptor {
            host: args.db_host.clone(),
            port: args.db_port,
            name: args.db_name.clone(),
            user: args.db_user.clone().unwrap_or_else(|| args.db_name.clone()),
            password_ref: args.password_ref.clone(),
            table_prefix: args.table_prefix.clone(),
        },
        stack: None,
        lock: None,
        source: SourceDescriptor {
            repo_url: args.repo.clone(),
            branch: args.branch.clone(),
            deployed_revision: None,
            deployed_at: None,
        },
        file_root: args.file_root.clone(),
        status: EnvStatus::Running,
        app_version: None,
        runtime_version: None,
        multisite: false,
        created_at: now.clone(),
        updated_at: now,
        checksum: None,
    };
    engine.register_production(&env).map_err(core_err)?;

    if json {
        let payload = serde_json::json!({
            "env_id": args.name,
            "domain": args.domain,
            "registered": true,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "registered production environment '{}' ({})",
            args.name, args.domain
        );
    }
    Ok(EXIT_SUCCESS)
}
