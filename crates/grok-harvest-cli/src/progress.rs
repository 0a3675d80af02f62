use colored::*;
use grok_harvest_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Renders a retrieval run as a single indicatif bar with failures printed above it.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            f(pb);
        }
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_run_start(&self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Retrieving [{bar:30.cyan/dim}] {pos}/{len} {msg}",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));

        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.replace(pb) {
            old.finish_and_clear();
        }
    }

    fn on_item_start(&self, _index: usize, _total: usize, filename: &str) {
        self.with_bar(|pb| pb.set_message(filename.to_string()));
    }

    fn on_item_complete(&self, processed: usize, _succeeded: usize, _total: usize) {
        self.with_bar(|pb| pb.set_position(processed as u64));
    }

    fn on_item_failed(&self, asset_id: &str, reason: &str) {
        self.with_bar(|pb| pb.println(format!("  {} {}: {}", "✗".red(), asset_id, reason)));
    }

    fn on_run_cancelled(&self, succeeded: usize, total: usize) {
        self.finish_bar();
        eprintln!(
            "  {} Cancelled: {}/{} retrieved",
            "■".yellow(),
            succeeded,
            total
        );
    }

    fn on_run_complete(&self, succeeded: usize, failed: usize) {
        self.finish_bar();
        eprintln!(
            "  {} Retrieval complete: {} retrieved, {} failed",
            "✓".green(),
            succeeded,
            failed
        );
    }
}
