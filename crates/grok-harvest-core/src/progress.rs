/// Trait for reporting retrieval run progress.
///
/// CLI implements with indicatif; the presentation layer of an embedding host
/// can map these to button labels. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, _total: usize) {}
    fn on_item_start(&self, _index: usize, _total: usize, _filename: &str) {}
    fn on_item_complete(&self, _processed: usize, _succeeded: usize, _total: usize) {}
    fn on_item_failed(&self, _asset_id: &str, _reason: &str) {}
    fn on_run_cancelled(&self, _succeeded: usize, _total: usize) {}
    fn on_run_complete(&self, _succeeded: usize, _failed: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
