/// Config schema types (telegram account, batch behavior, fetch tool).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchcastConfig {
    pub telegram: TelegramConfig,
    pub batch: BatchConfig,
    pub fetcher: FetcherConfig,
}

/// Telegram bot account and caller allow-list.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Caller ids (chat ids) allowed to start a batch. Empty denies everyone.
    pub allowlist: Vec<String>,

    /// HTTP client timeout; must exceed the 30s long-polling window.
    pub client_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            allowlist: Vec::new(),
            client_timeout_secs: 45,
        }
    }
}

/// What to do after the destination answers a publish with a retry-after.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Sleep for the requested duration, then move on without re-sending.
    WaitOnly,
    /// Sleep for the requested duration, then re-send the same artifact once.
    #[default]
    RetryOnce,
}

/// Batch conversation and publishing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Credit line appended to every caption.
    pub attribution: String,
    /// Label used when `/d` is sent but no file was uploaded.
    pub default_label: String,
    /// How long each prompt waits for a reply before the batch is aborted.
    pub prompt_timeout_secs: u64,
    pub rate_limit_policy: RateLimitPolicy,
    /// Delete the local video when its upload fails for a non rate-limit reason.
    pub remove_abandoned_artifacts: bool,
    /// Optional thumbnail attached to every upload.
    pub thumbnail: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            attribution: "batchcast".into(),
            default_label: "Batch".into(),
            prompt_timeout_secs: 300,
            rate_limit_policy: RateLimitPolicy::default(),
            remove_abandoned_artifacts: true,
            thumbnail: None,
        }
    }
}

/// External fetch tool (yt-dlp compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Path or name of the fetch binary.
    pub command: String,
    /// Directory where uploads and videos are written.
    pub work_dir: PathBuf,
    /// Kill the fetch process after this many seconds (0 = no limit).
    pub timeout_secs: u64,
    /// Extra arguments inserted before the source URL.
    pub extra_args: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            command: "yt-dlp".into(),
            work_dir: PathBuf::from("downloads"),
            timeout_secs: 0,
            extra_args: Vec::new(),
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
