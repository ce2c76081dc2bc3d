//! Encode job dispatcher.
//!
//! Turns a checked [`InputFile`] and a [`crate::profile::RenditionCatalog`]
//! into one concurrently running engine job per rendition. Every job reports
//! back through a channel of [`JobCompletion`] events; the dispatcher itself
//! never waits on a job.

mod dispatch;
mod error;
mod types;

pub use dispatch::Dispatcher;
pub use error::DispatchError;
pub use types::{EncodeJob, InputFile, JobCompletion, JobHandle, JobOutcome};
