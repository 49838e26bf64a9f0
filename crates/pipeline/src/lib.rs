//! Conversational batch pipeline.
//!
//! A caller on the allowlist starts a session, answers four prompts (links,
//! label, quality, destination), and the pipeline then fetches every link
//! with an external tool and uploads the result to the destination channel,
//! one item at a time. Item failures are recorded in a [`BatchReport`] and
//! never stop the batch.

pub mod acquire;
pub mod batch;
pub mod context;
pub mod controller;
pub mod error;
pub mod format;
pub mod gate;
pub mod inbox;
pub mod input;
pub mod publish;
pub mod report;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    acquire::{Artifact, Fetcher, YtDlpFetcher},
    batch::{BatchJob, Reference, run_batch},
    context::{PipelineContext, PipelineSettings},
    controller::run_session,
    error::{Error, Result},
    inbox::SessionInbox,
    report::{BatchReport, ItemOutcome, ItemStatus, SessionOutcome},
};
