use super::{colorize_status, core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(engine: &Engine, env_id: &str, json: bool) -> Result<u8, String> {
    let env = engine.environment(env_id).map_err(core_err)?;

    if json {
        println!("{}", json_pretty(&env)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("env_id:       {}", env.env_id);
    println!("kind:         {}", env.kind);
    println!("status:       {}", colorize_status(&env.status.to_string()));
    println!("domain:       {}", env.domain);
    if let Some(production) = &env.production {
        println!("production:   {production}");
    }
    println!(
        "database:     {} @ {}:{} (prefix {})",
        env.database.name, env.database.host, env.database.port, env.database.table_prefix
    );
    println!("branch:       {}", env.source.branch);
    if let Some(revision) = &env.source.deployed_revision {
        println!("deployed:     {revision}");
    }
    println!("file root:    {}", env.file_root);
    if let Some(stack) = &env.stack {
        println!("stack:        {} (port {})", stack.path, stack.http_port);
    }
    if let Some(version) = &env.app_version {
        println!("app version:  {version}");
    }
    println!("multisite:    {}", env.multisite);
    if let Some(lock) = &env.lock {
        println!(
            "locked by:    {} ({}) until {}",
            lock.locked_by, lock.reason, lock.expires_at
        );
    }
    println!("created:      {}", env.created_at);
    println!("updated:      {}", env.updated_at);
    Ok(EXIT_SUCCESS)
}
