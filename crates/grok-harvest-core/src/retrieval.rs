//! Sequential, cancellable bulk retrieval.

use crate::model::Asset;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    Success,
    Error(String),
    Timeout,
}

impl RetrievalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetrievalOutcome::Success)
    }
}

/// Fetches one URL to storage under a suggested name.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, url: &str, suggested_name: &str) -> RetrievalOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyRunning,
    EmptyBacklog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Rejected(RejectReason),
    Completed {
        succeeded: usize,
        failed: usize,
    },
    Cancelled {
        succeeded: usize,
        failed: usize,
        total: usize,
    },
}

impl RunOutcome {
    /// Short label for the presentation layer.
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Rejected(RejectReason::AlreadyRunning) => "Already running".to_string(),
            RunOutcome::Rejected(RejectReason::EmptyBacklog) => "✓ All Done".to_string(),
            RunOutcome::Completed { failed: 0, .. } => "✓ All Done".to_string(),
            RunOutcome::Completed { failed, .. } => format!("Done ({} failed)", failed),
            RunOutcome::Cancelled {
                succeeded, total, ..
            } => format!("Cancelled ({}/{} done)", succeeded, total),
        }
    }
}

#[derive(Default)]
struct ControlFlags {
    running: AtomicBool,
    cancel_requested: AtomicBool,
}

/// Cloneable handle for observing and cancelling a run from outside the loop.
#[derive(Clone, Default)]
pub struct RunControl {
    flags: Arc<ControlFlags>,
}

impl RunControl {
    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    /// Request a stop at the next item boundary. Ignored unless a run is in progress.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.flags.cancel_requested.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.flags.cancel_requested.load(Ordering::SeqCst)
    }

    fn begin(&self) -> bool {
        let started = self
            .flags
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if started {
            self.flags.cancel_requested.store(false, Ordering::SeqCst);
        }
        started
    }

    fn take_cancel(&self) -> bool {
        self.flags.cancel_requested.swap(false, Ordering::SeqCst)
    }

    fn finish(&self) {
        self.flags.running.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator {
    control: RunControl,
    state: RunState,
    delay: Duration,
}

impl Orchestrator {
    pub fn new(delay: Duration) -> Self {
        Self {
            control: RunControl::default(),
            state: RunState::Idle,
            delay,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    /// Retrieve `items` one at a time, pausing `delay` between items.
    ///
    /// Failures are counted and skipped, never retried. Cancellation is checked
    /// before each item and once more after the last; the item in flight always
    /// finishes. `on_success` runs
    /// for every retrieved asset before the next one starts.
    pub async fn run<F>(
        &mut self,
        items: Vec<Asset>,
        retriever: &dyn Retriever,
        reporter: &dyn ProgressReporter,
        mut on_success: F,
    ) -> RunOutcome
    where
        F: FnMut(&Asset),
    {
        if self.control.is_running() {
            return RunOutcome::Rejected(RejectReason::AlreadyRunning);
        }
        if items.is_empty() {
            return RunOutcome::Rejected(RejectReason::EmptyBacklog);
        }
        if !self.control.begin() {
            return RunOutcome::Rejected(RejectReason::AlreadyRunning);
        }

        self.state = RunState::Running;
        let total = items.len();
        let mut succeeded = 0;
        let mut failed = 0;
        info!("Starting retrieval of {} items", total);
        reporter.on_run_start(total);

        for (index, asset) in items.iter().enumerate() {
            if self.control.take_cancel() {
                return self.cancelled(reporter, succeeded, failed, total);
            }

            reporter.on_item_start(index, total, &asset.filename);
            match retrieve_item(retriever, asset).await {
                RetrievalOutcome::Success => {
                    succeeded += 1;
                    on_success(asset);
                }
                RetrievalOutcome::Error(reason) => {
                    failed += 1;
                    reporter.on_item_failed(&asset.id, &reason);
                }
                RetrievalOutcome::Timeout => {
                    failed += 1;
                    reporter.on_item_failed(&asset.id, "timed out");
                }
            }
            reporter.on_item_complete(index + 1, succeeded, total);

            if index + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        // A cancel raised during the last item still wins over completion.
        if self.control.take_cancel() {
            return self.cancelled(reporter, succeeded, failed, total);
        }

        self.state = RunState::Completed;
        self.control.finish();
        info!(
            "Retrieval finished: {} succeeded, {} failed",
            succeeded, failed
        );
        reporter.on_run_complete(succeeded, failed);
        RunOutcome::Completed { succeeded, failed }
    }

    fn cancelled(
        &mut self,
        reporter: &dyn ProgressReporter,
        succeeded: usize,
        failed: usize,
        total: usize,
    ) -> RunOutcome {
        self.state = RunState::Cancelled;
        self.control.finish();
        info!("Retrieval cancelled after {}/{} items", succeeded, total);
        reporter.on_run_cancelled(succeeded, total);
        RunOutcome::Cancelled {
            succeeded,
            failed,
            total,
        }
    }
}

/// Retrieve one asset and log the outcome. Bookkeeping is the caller's job.
pub async fn retrieve_item(retriever: &dyn Retriever, asset: &Asset) -> RetrievalOutcome {
    debug!("Retrieving {} as {}", asset.id, asset.filename);
    let outcome = retriever.retrieve(&asset.url, &asset.filename).await;
    match &outcome {
        RetrievalOutcome::Success => debug!("Retrieved {}", asset.id),
        RetrievalOutcome::Error(reason) => warn!("Failed to retrieve {}: {}", asset.id, reason),
        RetrievalOutcome::Timeout => warn!("Timed out retrieving {}", asset.id),
    }
    outcome
}
