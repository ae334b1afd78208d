use super::{core_err, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(engine: &Engine, env_id: &str, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let pb = (!json).then(|| spinner(&format!("deleting '{env_id}'...")));
    match engine.delete_environment(env_id) {
        Ok(()) => {
            if let Some(pb) = &pb {
                spin_ok(pb, &format!("environment '{env_id}' deleted"));
            }
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "delete failed");
            }
            return Err(core_err(e));
        }
    }

    if json {
        let payload = serde_json::json!({ "env_id": env_id, "deleted": true });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
