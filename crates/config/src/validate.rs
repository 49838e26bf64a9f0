use std::path::PathBuf;

use secrecy::ExposeSecret;

use crate::schema::BatchcastConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "batch.prompt_timeout_secs"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Longest attribution that still leaves room for the rest of a caption.
pub const MAX_ATTRIBUTION_CHARS: usize = 256;

/// Check a loaded config for values the bot cannot run with.
pub fn validate(config: &BatchcastConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.telegram.token.expose_secret().trim().is_empty() {
        result.push(
            Severity::Error,
            "telegram.token",
            "bot token is empty (set it in the config or via BOT_TOKEN)",
        );
    }

    if config.telegram.allowlist.is_empty() {
        result.push(
            Severity::Warning,
            "telegram.allowlist",
            "allowlist is empty, nobody can start a batch",
        );
    }

    if config.telegram.client_timeout_secs <= 30 {
        result.push(
            Severity::Warning,
            "telegram.client_timeout_secs",
            "client timeout should exceed the 30s long-polling window",
        );
    }

    if config.batch.prompt_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "batch.prompt_timeout_secs",
            "prompt timeout must be greater than zero",
        );
    }

    if config.fetcher.command.trim().is_empty() {
        result.push(
            Severity::Error,
            "fetcher.command",
            "fetch command must not be empty",
        );
    }

    if let Some(ref thumb) = config.batch.thumbnail
        && !thumb.exists()
    {
        result.push(
            Severity::Warning,
            "batch.thumbnail",
            format!("thumbnail {} does not exist", thumb.display()),
        );
    }

    if config.batch.attribution.chars().count() > MAX_ATTRIBUTION_CHARS {
        result.push(
            Severity::Error,
            "batch.attribution",
            format!("attribution is longer than {MAX_ATTRIBUTION_CHARS} characters and would not fit a caption"),
        );
    }

    if config.batch.attribution.trim().is_empty() {
        result.push(
            Severity::Info,
            "batch.attribution",
            "attribution is empty, captions will end with a blank credit line",
        );
    }

    result
}
