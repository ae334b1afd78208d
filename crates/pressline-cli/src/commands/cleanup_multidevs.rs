use super::{core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(engine: &Engine, production: &str, dry_run: bool, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let report = engine
        .cleanup_stale_multidevs(production, dry_run)
        .map_err(core_err)?;

    if json {
        let payload = serde_json::json!({
            "production": production,
            "dry_run": dry_run,
            "stale": report.stale,
            "deleted": report.deleted,
            "errors": report.errors,
        });
        println!("{}", json_pretty(&payload)?);
    } else if report.stale.is_empty() {
        println!("no stale multidev environments for '{production}'");
    } else {
        let prefix = if dry_run { "would delete" } else { "deleted" };
        for env_id in &report.stale {
            let outcome = report
                .errors
                .iter()
                .find(|(e, _)| e == env_id)
                .map(|(_, msg)| format!("failed: {msg}"));
            match outcome {
                Some(msg) => println!("{env_id}: {msg}"),
                None => println!("{env_id}: {prefix}"),
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
