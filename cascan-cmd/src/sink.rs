//! Console progress rendering.

use std::collections::HashMap;
use std::sync::Mutex;

use cascan_lib::progress::ProgressSink;

/// Renders progress to stderr, at most once per 10% step per task, so the
/// computation never waits on the terminal.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    last_percent: Mutex<HashMap<String, u64>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleSink {
    fn update(&self, task: &str, processed: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = processed * 100 / total;
        let step = percent / 10 * 10;

        let mut last = match self.last_percent.lock() {
            Ok(guard) => guard,
            // a poisoned progress lock is not worth failing an analysis over
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.get(task).copied() != Some(step) {
            last.insert(task.to_owned(), step);
            eprintln!("{task}: {percent}% ({processed}/{total})");
        }
    }

    fn complete(&self, task: &str) {
        eprintln!("{task}: done");
    }
}
