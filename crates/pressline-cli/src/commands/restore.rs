use super::{core_err, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(engine: &Engine, env_id: &str, snapshot_id: &str, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let pb = (!json).then(|| spinner(&format!("restoring {snapshot_id}...")));
    match engine.restore_snapshot(env_id, snapshot_id) {
        Ok(()) => {
            if let Some(pb) = &pb {
                spin_ok(pb, &format!("'{env_id}' restored from {snapshot_id}"));
            }
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "restore failed");
            }
            return Err(core_err(e));
        }
    }

    if json {
        let payload = serde_json::json!({
            "env_id": env_id,
            "snapshot_id": snapshot_id,
            "restored": true,
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
