use super::{core_err, json_pretty, SpinnerProgress, EXIT_FAILURE, EXIT_SUCCESS};
use pressline_core::{Engine, ProgressObserver, PromoteOptions};
use pressline_schema::{JobStatus, PromotionJob};

pub fn run_code(
    engine: &Engine,
    source: &str,
    target: &str,
    opts: &PromoteOptions,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let pb = (!json).then(|| SpinnerProgress::new("promoting code..."));
    let observer = pb.as_ref().map(|p| p as &dyn ProgressObserver);
    let job = match engine.promote_code(source, target, opts, observer) {
        Ok(job) => job,
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_fail("code promotion failed");
            }
            return Err(core_err(e));
        }
    };
    finish(&pb, &job, "code promotion");
    print_job(&job, json)
}

pub fn run_database(
    engine: &Engine,
    source: &str,
    target: &str,
    opts: &PromoteOptions,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let pb = (!json).then(|| SpinnerProgress::new("promoting database..."));
    let observer = pb.as_ref().map(|p| p as &dyn ProgressObserver);
    let job = match engine.promote_database(source, target, opts, observer) {
        Ok(job) => job,
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_fail("database promotion failed");
            }
            return Err(core_err(e));
        }
    };
    finish(&pb, &job, "database promotion");
    print_job(&job, json)
}

pub fn run_full(
    engine: &Engine,
    source: &str,
    target: &str,
    opts: &PromoteOptions,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let pb = (!json).then(|| SpinnerProgress::new("promoting code and database..."));
    let observer = pb.as_ref().map(|p| p as &dyn ProgressObserver);
    let report = match engine.promote_full(source, target, opts, observer) {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_fail("promotion failed");
            }
            return Err(core_err(e));
        }
    };

    let failed = report.code.status == JobStatus::Failed
        || report.database_error.is_some()
        || report
            .database
            .as_ref()
            .is_some_and(|j| j.status == JobStatus::Failed);
    if let Some(pb) = &pb {
        if failed {
            pb.finish_fail("promotion failed");
        } else {
            pb.finish_ok(&format!("promoted '{source}' into '{target}'"));
        }
    }

    if json {
        let payload = serde_json::json!({
            "code": job_payload(&report.code),
            "database": report.database.as_ref().map(job_payload),
            "database_error": report.database_error.as_ref().map(ToString::to_string),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print_job_line(&report.code);
        match (&report.database, &report.database_error) {
            (Some(job), _) => print_job_line(job),
            (None, Some(_)) => {
                println!("code was promoted, but the database stage did not start");
            }
            (None, None) => println!("database promotion skipped (code promotion failed)"),
        }
    }
    if let Some(e) = report.database_error {
        return Err(core_err(e));
    }
    Ok(if failed { EXIT_FAILURE } else { EXIT_SUCCESS })
}

fn finish(pb: &Option<SpinnerProgress>, job: &PromotionJob, what: &str) {
    if let Some(pb) = pb {
        if job.status == JobStatus::Failed {
            pb.finish_fail(&format!("{what} failed"));
        } else {
            pb.finish_ok(&format!("{what} completed"));
        }
    }
}

fn job_payload(job: &PromotionJob) -> serde_json::Value {
    serde_json::json!({
        "job_id": job.job_id,
        "kind": job.kind.to_string(),
        "status": job.status,
        "snapshot": job.snapshot,
        "error": job.error,
    })
}

fn print_job_line(job: &PromotionJob) {
    match &job.error {
        Some(error) => println!("{} {}: failed: {error}", job.kind, job.job_id),
        None => println!("{} {}: completed", job.kind, job.job_id),
    }
}

fn print_job(job: &PromotionJob, json: bool) -> Result<u8, String> {
    if json {
        println!("{}", json_pretty(&job_payload(job))?);
    } else {
        print_job_line(job);
        if let Some(snapshot) = &job.snapshot {
            println!("pre-promotion snapshot: {snapshot}");
        }
    }
    Ok(if job.status == JobStatus::Failed {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}
