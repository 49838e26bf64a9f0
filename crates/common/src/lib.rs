//! Message types and error helpers shared by the batchcast crates.

pub mod error;
pub mod types;

pub use error::FromMessage;
