use super::{core_err, json_pretty, EXIT_SUCCESS};
use pressline_core::Engine;

pub fn run(engine: &Engine, a: &str, b: &str, json: bool) -> Result<u8, String> {
    let report = engine.compare_environments(a, b).map_err(core_err)?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    if report.attribute_diffs.is_empty() {
        println!("attributes: identical");
    } else {
        println!("attributes:");
        for diff in &report.attribute_diffs {
            println!("  {}: {} != {}", diff.field, diff.a, diff.b);
        }
    }

    if !report.extensions_compared {
        println!("extensions: not compared (a stack was unreachable)");
    } else if report.extension_diffs.is_empty() {
        println!(
            "extensions: identical ({} matching)",
            report.extensions_matching.len()
        );
    } else {
        println!("extensions:");
        for diff in &report.extension_diffs {
            let a = diff.a.as_deref().unwrap_or("absent");
            let b = diff.b.as_deref().unwrap_or("absent");
            println!("  {}: {a} != {b}", diff.name);
        }
    }
    Ok(EXIT_SUCCESS)
}
