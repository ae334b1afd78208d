use super::{core_err, json_pretty, SpinnerProgress, EXIT_SUCCESS};
use pressline_core::{Engine, ProgressObserver, SyncOptions};
use pressline_transform::TransformOptions;

pub fn run(
    engine: &Engine,
    env_id: &str,
    no_snapshot: bool,
    files: bool,
    anonymize: bool,
    exclude_tables: Vec<String>,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let opts = SyncOptions {
        snapshot_first: !no_snapshot,
        sync_files: files,
        transform: TransformOptions {
            anonymize,
            anonymize_names: anonymize,
            ..Default::default()
        },
        exclude_tables,
    };

    let pb = (!json).then(|| SpinnerProgress::new("syncing from production..."));
    let observer = pb.as_ref().map(|p| p as &dyn ProgressObserver);

    let report = match engine.sync_from_production(env_id, &opts, observer) {
        Ok(report) => {
            if let Some(pb) = &pb {
                pb.finish_ok(&format!("'{env_id}' synced from production"));
            }
            report
        }
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_fail("sync failed");
            }
            return Err(core_err(e));
        }
    };

    if json {
        let payload = serde_json::json!({
            "env_id": env_id,
            "snapshot": report.snapshot,
            "lines_in": report.transform.as_ref().map(|s| s.lines_in),
            "lines_out": report.transform.as_ref().map(|s| s.lines_out),
            "skipped_inserts": report.transform.as_ref().map(|s| s.skipped_inserts),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        if let Some(snapshot) = &report.snapshot {
            println!("pre-sync snapshot: {snapshot}");
        }
        if let Some(stats) = &report.transform {
            println!(
                "transformed {} lines ({} inserts skipped)",
                stats.lines_in, stats.skipped_inserts
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
