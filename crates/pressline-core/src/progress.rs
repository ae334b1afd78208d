//! Step-by-step progress reporting for long workflows.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Receives `(step_index, total_steps, message)` during a workflow run.
///
/// Observer errors never fail a workflow; panics raised by an
/// implementation are caught and logged.
pub trait ProgressObserver: Send + Sync {
    fn on_step(&self, step: usize, total: usize, message: &str);
}

pub(crate) fn report(
    observer: Option<&dyn ProgressObserver>,
    step: usize,
    total: usize,
    message: &str,
) {
    debug!("step {step}/{total}: {message}");
    if let Some(obs) = observer {
        let result = catch_unwind(AssertUnwindSafe(|| obs.on_step(step, total, message)));
        if result.is_err() {
            warn!("progress observer panicked on step {step}/{total}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        steps: Mutex<Vec<(usize, usize, String)>>,
    }

    impl ProgressObserver for Recorder {
        fn on_step(&self, step: usize, total: usize, message: &str) {
            self.steps
                .lock()
                .unwrap()
                .push((step, total, message.to_owned()));
        }
    }

    struct Panicker;

    impl ProgressObserver for Panicker {
        fn on_step(&self, _step: usize, _total: usize, _message: &str) {
            panic!("observer blew up");
        }
    }

    #[test]
    fn steps_are_delivered_in_order() {
        let rec = Recorder {
            steps: Mutex::new(Vec::new()),
        };
        report(Some(&rec), 1, 3, "export");
        report(Some(&rec), 2, 3, "transform");
        report(Some(&rec), 3, 3, "import");

        let steps = rec.steps.lock().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], (1, 3, "export".to_owned()));
        assert_eq!(steps[2].0, 3);
    }

    #[test]
    fn observer_panic_is_swallowed() {
        report(Some(&Panicker), 1, 1, "boom");
    }

    #[test]
    fn no_observer_is_fine() {
        report(None, 1, 2, "quiet");
    }
}
