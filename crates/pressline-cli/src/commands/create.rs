use super::{core_err, json_pretty, SpinnerProgress, EXIT_SUCCESS};
use pressline_core::{CreateOptions, Engine, ProgressObserver};
use pressline_schema::EnvKind;

pub fn run(
    engine: &Engine,
    production: &str,
    kind: EnvKind,
    opts: &CreateOptions,
    json: bool,
) -> Result<u8, String> {
    let _lock = super::store_guard(engine)?;

    let pb = (!json).then(|| SpinnerProgress::new("creating environment..."));
    let observer = pb.as_ref().map(|p| p as &dyn ProgressObserver);

    let outcome = match engine.create_environment(production, kind, opts, observer) {
        Ok(outcome) => {
            if let Some(pb) = &pb {
                pb.finish_ok(&format!(
                    "environment '{}' created",
                    outcome.environment.name
                ));
            }
            outcome
        }
        Err(e) => {
            if let Some(pb) = &pb {
                pb.finish_fail("create failed");
            }
            return Err(core_err(e));
        }
    };

    if json {
        let payload = serde_json::json!({
            "env_id": outcome.environment.env_id,
            "kind": kind.to_string(),
            "domain": outcome.environment.domain,
            "status": outcome.environment.status.to_string(),
            "warnings": outcome.warnings,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("domain: {}", outcome.environment.domain);
        if let Some(stack) = &outcome.environment.stack {
            println!("http port: {}", stack.http_port);
        }
        for w in &outcome.warnings {
            println!("warning: {w}");
        }
    }
    Ok(EXIT_SUCCESS)
}
