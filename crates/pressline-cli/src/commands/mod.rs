pub mod cleanup_multidevs;
pub mod compare;
pub mod completions;
pub mod create;
pub mod delete;
pub mod inspect;
pub mod list;
pub mod lock;
pub mod log;
pub mod promote;
pub mod register;
pub mod restore;
pub mod snapshot;
pub mod sync;
pub mod unlock;

use indicatif::{ProgressBar, ProgressStyle};
use pressline_core::{CoreError, Engine, ProgressObserver, StoreLock};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_LOCKED: u8 = 4;

/// Flatten a core error into the prefixed message form main() maps to
/// exit codes.
pub fn core_err(e: CoreError) -> String {
    match e {
        CoreError::LockConflict { .. } => format!("locked: {e}"),
        CoreError::Store(_) => format!("store error: {e}"),
        CoreError::Schema(_) => format!("config error: {e}"),
        other => other.to_string(),
    }
}

/// Serialize mutating commands against other pressline processes on
/// the same store. Fails fast instead of queueing behind the holder.
pub fn store_guard(engine: &Engine) -> Result<StoreLock, String> {
    StoreLock::try_acquire(engine.store_layout()).map_err(|e| format!("store lock: {e}"))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Routes engine step reports onto a spinner.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new(msg: &str) -> Self {
        Self { bar: spinner(msg) }
    }

    pub fn finish_ok(&self, msg: &str) {
        spin_ok(&self.bar, msg);
    }

    pub fn finish_fail(&self, msg: &str) {
        spin_fail(&self.bar, msg);
    }
}

impl ProgressObserver for SpinnerProgress {
    fn on_step(&self, step: usize, total: usize, message: &str) {
        self.bar.set_message(format!("[{step}/{total}] {message}"));
    }
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "running" => Style::new().green().apply_to(status).to_string(),
        "deploying" => Style::new().cyan().apply_to(status).to_string(),
        "failed" => Style::new().red().bold().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_value() {
        let val = serde_json::json!({"env": "blog-dev"});
        let out = json_pretty(&val).unwrap();
        assert!(out.contains("\"env\""));
        assert!(out.contains("\"blog-dev\""));
    }

    #[test]
    fn core_err_prefixes_lock_conflicts() {
        let e = CoreError::LockConflict {
            env_id: "blog-dev".to_owned(),
            owner: "alice".to_owned(),
            reason: "deploy".to_owned(),
        };
        assert!(core_err(e).starts_with("locked:"));
    }

    #[test]
    fn colorize_passes_unknown_through() {
        assert_eq!(colorize_status("weird"), "weird");
    }
}
