//! Transport seam between the batch pipeline and a messaging platform.
//!
//! A platform crate (Telegram) implements [`ChannelTransport`]; the pipeline
//! only talks to the trait, so it can be driven by a mock in tests.

pub mod error;
pub mod gating;
pub mod transport;

pub use {
    error::{Error, Result},
    gating::Allowlist,
    transport::{ChannelTransport, EndpointInfo, PublishError, VideoUpload},
};
