use super::{colorize_status, core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let mut envs = engine.list_environments().map_err(core_err)?;
    envs.sort_by(|a, b| a.env_id.cmp(&b.env_id));

    if json {
        let entries: Vec<_> = envs
            .iter()
            .map(|e| {
                serde_json::json!({
                    "env_id": e.env_id,
                    "kind": e.kind.to_string(),
                    "status": e.status.to_string(),
                    "domain": e.domain,
                    "branch": e.source.branch,
                    "locked": e.lock.is_some(),
                })
            })
            .collect();
        println!("{}", json_pretty(&entries)?);
        return Ok(EXIT_SUCCESS);
    }

    if envs.is_empty() {
        println!("no environments");
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "{:<24} {:<12} {:<10} {:<32} {}",
        "ENV", "KIND", "STATUS", "DOMAIN", "BRANCH"
    );
    for env in &envs {
        let lock_marker = if env.lock.is_some() { " [locked]" } else { "" };
        println!(
            "{:<24} {:<12} {:<10} {:<32} {}{lock_marker}",
            env.env_id.as_str(),
            env.kind.to_string(),
            colorize_status(&env.status.to_string()),
            env.domain,
            env.source.branch,
        );
    }
    Ok(EXIT_SUCCESS)
}
