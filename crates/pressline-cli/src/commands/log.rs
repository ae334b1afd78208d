use super::{core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;
use pressline_schema::ActivityStatus;

pub fn run(engine: &Engine, env_id: &str, limit: usize, json: bool) -> Result<u8, String> {
    let records = engine.recent_activity(env_id, limit).map_err(core_err)?;

    if json {
        println!("{}", json_pretty(&records)?);
        return Ok(EXIT_SUCCESS);
    }

    if records.is_empty() {
        println!("no activity for '{env_id}'");
        return Ok(EXIT_SUCCESS);
    }

    for rec in &records {
        let marker = match rec.status {
            ActivityStatus::Started => "...",
            ActivityStatus::Completed => " ✓ ",
            ActivityStatus::Failed => " ✗ ",
        };
        let duration = rec
            .duration_ms
            .map(|ms| format!(" ({ms}ms)"))
            .unwrap_or_default();
        match &rec.error {
            Some(error) => println!(
                "{} {marker} {:<14} {}: {error}{duration}",
                rec.recorded_at, rec.action, rec.actor
            ),
            None => println!(
                "{} {marker} {:<14} {}{duration}",
                rec.recorded_at, rec.action, rec.actor
            ),
        }
    }
    Ok(EXIT_SUCCESS)
}
