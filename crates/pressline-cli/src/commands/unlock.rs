use super::{core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;

/// Unlocking is unconditional at the engine level; the CLI refuses to
/// release another actor's unexpired lock unless `--force` is given.
pub fn run(engine: &Engine, env_id: &str, force: bool, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let held = engine.lock_manager().holder(env_id).map_err(core_err)?;
    let Some(held) = held else {
        if json {
            let payload = serde_json::json!({ "env_id": env_id, "unlocked": false });
            println!("{}", json_pretty(&payload)?);
        } else {
            println!("'{env_id}' is not locked");
        }
        return Ok(EXIT_SUCCESS);
    };

    let own = held.locked_by == engine.config().actor;
    if !own && !held.is_expired(&chrono::Utc::now()) && !force {
        return Err(format!(
            "locked: '{env_id}' is locked by {} until {} ({}); pass --force to release it",
            held.locked_by, held.expires_at, held.reason
        ));
    }

    engine.unlock_environment(env_id).map_err(core_err)?;

    if json {
        let payload = serde_json::json!({
            "env_id": env_id,
            "unlocked": true,
            "was_held_by": held.locked_by,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("unlocked '{env_id}' (was held by {})", held.locked_by);
    }
    Ok(EXIT_SUCCESS)
}
