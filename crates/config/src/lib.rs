//! Configuration loading, validation, and env substitution.
//!
//! Config files: `batchcast.toml`, `batchcast.yaml`, or `batchcast.json`
//! Searched in `./` then `~/.config/batchcast/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{BatchConfig, BatchcastConfig, FetcherConfig, RateLimitPolicy, TelegramConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
