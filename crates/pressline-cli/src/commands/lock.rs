use super::{core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(
    engine: &Engine,
    env_id: &str,
    reason: &str,
    hours: i64,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    engine
        .lock_environment(env_id, reason, hours)
        .map_err(core_err)?;

    if json {
        let payload = serde_json::json!({
            "env_id": env_id,
            "locked": true,
            "reason": reason,
            "hours": hours,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("locked '{env_id}' for {hours}h: {reason}");
    }
    Ok(EXIT_SUCCESS)
}
