//! Batch bookkeeping for one pipeline invocation.

use std::time::Duration;

use crate::engine::{EncodeOutcome, EngineError};
use crate::profile::RenditionProfile;

use crate::dispatcher::{JobCompletion, JobOutcome};

/// A rendition that encoded successfully.
#[derive(Debug, Clone)]
pub struct RenditionSuccess {
    /// Position of the profile in the catalog.
    pub index: usize,
    pub profile: RenditionProfile,
    /// Media playlist path relative to the output root.
    pub variant_uri: String,
    pub outcome: EncodeOutcome,
    pub elapsed: Duration,
}

/// The rendition failure reported for a batch.
#[derive(Debug)]
pub struct RenditionFailure {
    /// Position of the profile in the catalog.
    pub index: usize,
    pub profile: RenditionProfile,
    pub error: EngineError,
}

/// How a completion event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Counted towards the batch.
    Accepted,
    /// A completion for this slot was already counted.
    Duplicate,
    /// The index does not belong to this batch.
    OutOfRange,
}

/// Mutable state of one batch.
///
/// Successes are stored by catalog index, so [`BatchState::take_successes`]
/// yields them in catalog order no matter which job finished first.
#[derive(Debug)]
pub struct BatchState {
    total: usize,
    completed: usize,
    reported: Vec<bool>,
    successes: Vec<Option<RenditionSuccess>>,
    first_error: Option<RenditionFailure>,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            reported: vec![false; total],
            successes: (0..total).map(|_| None).collect(),
            first_error: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    pub fn has_failed(&self) -> bool {
        self.first_error.is_some()
    }

    pub fn first_error(&self) -> Option<&RenditionFailure> {
        self.first_error.as_ref()
    }

    /// Applies one completion event.
    pub fn record(&mut self, completion: JobCompletion) -> Recorded {
        let index = completion.index;
        match self.reported.get(index) {
            None => return Recorded::OutOfRange,
            Some(true) => return Recorded::Duplicate,
            Some(false) => {}
        }

        self.reported[index] = true;
        self.completed += 1;

        match completion.outcome {
            JobOutcome::Succeeded(outcome) => {
                self.successes[index] = Some(RenditionSuccess {
                    index,
                    profile: completion.profile,
                    variant_uri: completion.variant_uri,
                    outcome,
                    elapsed: completion.elapsed,
                });
            }
            JobOutcome::Failed(error) => {
                if self.first_error.is_none() {
                    self.first_error = Some(RenditionFailure {
                        index,
                        profile: completion.profile,
                        error,
                    });
                }
            }
        }

        Recorded::Accepted
    }

    pub(crate) fn take_first_error(&mut self) -> Option<RenditionFailure> {
        self.first_error.take()
    }

    pub(crate) fn take_successes(&mut self) -> Vec<RenditionSuccess> {
        self.successes.iter_mut().filter_map(Option::take).collect()
    }
}
