//! Completion aggregator.
//!
//! One [`Aggregator`] exists per batch and is the only owner of its
//! [`BatchState`]. Completion events arrive over a channel in whatever order
//! the jobs finish; the aggregator applies them one at a time, so the finalize
//! gate (`completed == total`) is crossed by exactly one event.
//!
//! ```text
//! Collecting ──(all reported, no error)──> Finalizing ──> Done
//!      └──────(all reported, error)──────> Failed
//! ```

mod state;

pub use state::{BatchState, Recorded, RenditionFailure, RenditionSuccess};

use tokio::sync::mpsc;
use tracing::warn;

use crate::dispatcher::JobCompletion;

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// Waiting for jobs to report.
    Collecting,
    /// Every job succeeded; the manifest is being written.
    Finalizing,
    /// Manifest written.
    Done,
    /// At least one job failed.
    Failed,
}

impl BatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Decision taken at the finalize gate.
#[derive(Debug)]
pub enum BatchVerdict {
    /// All renditions succeeded, in catalog order.
    Succeeded(Vec<RenditionSuccess>),
    /// The first failure recorded for the batch.
    Failed(RenditionFailure),
}

/// The completion channel closed before every job reported.
#[derive(Debug, thiserror::Error)]
#[error("Completion channel closed after {completed} of {total} jobs reported")]
pub struct IncompleteBatch {
    pub completed: usize,
    pub total: usize,
}

/// Single-owner state machine for one batch.
#[derive(Debug)]
pub struct Aggregator {
    state: BatchState,
    phase: BatchPhase,
}

impl Aggregator {
    pub fn new(total: usize) -> Self {
        Self {
            state: BatchState::new(total),
            phase: BatchPhase::Collecting,
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Applies one completion event.
    ///
    /// Returns the verdict for the event that completes the batch and `None`
    /// for every other event, including any arriving after the gate.
    pub fn on_completion(&mut self, completion: JobCompletion) -> Option<BatchVerdict> {
        if self.phase != BatchPhase::Collecting {
            warn!(
                job_id = %completion.job_id,
                phase = ?self.phase,
                "Ignoring completion after batch was decided"
            );
            return None;
        }

        let job_id = completion.job_id.clone();
        match self.state.record(completion) {
            Recorded::Accepted => {}
            Recorded::Duplicate => {
                warn!(job_id = %job_id, "Ignoring duplicate completion");
                return None;
            }
            Recorded::OutOfRange => {
                warn!(job_id = %job_id, "Ignoring completion for unknown job");
                return None;
            }
        }

        if !self.state.is_complete() {
            return None;
        }

        match self.state.take_first_error() {
            Some(failure) => {
                self.phase = BatchPhase::Failed;
                Some(BatchVerdict::Failed(failure))
            }
            None => {
                self.phase = BatchPhase::Finalizing;
                Some(BatchVerdict::Succeeded(self.state.take_successes()))
            }
        }
    }

    /// Marks a finalizing batch as done once its manifest is written.
    pub fn finish(&mut self) {
        if self.phase == BatchPhase::Finalizing {
            self.phase = BatchPhase::Done;
        }
    }

    /// Marks a finalizing batch as failed when the manifest could not be written.
    pub fn abort(&mut self) {
        if self.phase == BatchPhase::Finalizing {
            self.phase = BatchPhase::Failed;
        }
    }

    /// Drains completions until the batch is decided.
    ///
    /// `observe` sees every event before it is applied. Fails only if every
    /// sender is dropped before all jobs reported.
    pub async fn collect<F>(
        &mut self,
        completions: &mut mpsc::Receiver<JobCompletion>,
        mut observe: F,
    ) -> Result<BatchVerdict, IncompleteBatch>
    where
        F: FnMut(&JobCompletion),
    {
        while let Some(completion) = completions.recv().await {
            observe(&completion);
            if let Some(verdict) = self.on_completion(completion) {
                return Ok(verdict);
            }
        }

        Err(IncompleteBatch {
            completed: self.state.completed(),
            total: self.state.total(),
        })
    }
}
