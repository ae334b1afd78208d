use super::{core_err, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use pressline_core::Engine;
use pressline_schema::SnapshotRecord;
use pressline_store::SnapshotOptions;

pub fn run_create(
    engine: &Engine,
    env_id: &str,
    name: Option<&str>,
    tag: Option<&str>,
    compress: bool,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let opts = SnapshotOptions {
        name: name.unwrap_or_default().to_owned(),
        tag: tag.map(str::to_owned),
        compress,
        ..Default::default()
    };

    let pb = (!json).then(|| spinner("snapshotting database..."));
    let record = match engine.create_snapshot(env_id, &opts) {
        Ok(record) => {
            if let Some(pb) = &pb {
                spin_ok(pb, &format!("snapshot {} created", record.snapshot_id));
            }
            record
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "snapshot failed");
            }
            return Err(core_err(e));
        }
    };

    if json {
        println!("{}", json_pretty(&record)?);
    } else {
        println!(
            "{} tables, {} rows, {} bytes{}",
            record.tables.len(),
            record.row_count,
            record.size_bytes,
            if record.compressed { " (gzip)" } else { "" },
        );
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_list(engine: &Engine, env_id: Option<&str>, json: bool) -> Result<u8, String> {
    let snapshots = engine.list_snapshots(env_id).map_err(core_err)?;

    if json {
        println!("{}", json_pretty(&snapshots)?);
        return Ok(EXIT_SUCCESS);
    }

    if snapshots.is_empty() {
        match env_id {
            Some(env) => println!("no snapshots for '{env}'"),
            None => println!("no snapshots"),
        }
        return Ok(EXIT_SUCCESS);
    }

    for snap in &snapshots {
        println!("{}", describe(snap));
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_delete(engine: &Engine, snapshot_id: &str, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    engine.delete_snapshot(snapshot_id).map_err(core_err)?;
    if json {
        let payload = serde_json::json!({ "snapshot_id": snapshot_id, "deleted": true });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("deleted snapshot {snapshot_id}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_cleanup(engine: &Engine, include_tagged: bool, json: bool) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let report = engine.cleanup_snapshots(include_tagged).map_err(core_err)?;
    if json {
        let payload = serde_json::json!({
            "deleted": report.deleted,
            "kept_tagged": report.kept_tagged,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("deleted {} snapshots", report.deleted.len());
        if !report.kept_tagged.is_empty() {
            println!(
                "kept {} tagged snapshots past retention",
                report.kept_tagged.len()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn describe(snap: &SnapshotRecord) -> String {
    let mut line = format!(
        "{}  {}  {} rows",
        snap.snapshot_id, snap.created_at, snap.row_count
    );
    if let Some(tag) = &snap.tag {
        line.push_str(&format!("  [{tag}]"));
    }
    if !snap.name.is_empty() {
        line.push_str(&format!("  {}", snap.name));
    }
    line
}
