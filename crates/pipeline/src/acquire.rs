//! Acquisition step: run the external fetch tool for one reference.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    async_trait::async_trait,
    batchcast_config::FetcherConfig,
    tokio::process::Command,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    batch::Reference,
    error::{Error, Result},
};

/// A downloaded media file waiting for its single upload attempt.
///
/// Not `Clone`: publishing consumes it, so it cannot be uploaded twice.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    pub index: usize,
    pub path: PathBuf,
}

/// Fetches one reference into a local file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `reference` to `<stem>.mp4`, capped at `max_height` pixels.
    ///
    /// Returns [`Error::FetchFailed`] on any tool failure and
    /// [`Error::Cancelled`] when `cancel` fires first.
    async fn fetch(
        &self,
        index: usize,
        reference: &Reference,
        stem: &Path,
        max_height: &str,
        cancel: &CancellationToken,
    ) -> Result<Artifact>;
}

/// [`Fetcher`] backed by a yt-dlp compatible executable.
pub struct YtDlpFetcher {
    config: FetcherConfig,
}

impl YtDlpFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    /// Format selector: best video+audio not taller than `max_height`,
    /// falling back to the best single file within the same bound.
    pub fn format_selector(max_height: &str) -> String {
        format!("bv[height<={max_height}]+ba/b[height<={max_height}]")
    }

    fn build_args(&self, reference: &Reference, output: &Path, max_height: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            Self::format_selector(max_height),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--no-playlist".to_string(),
            "-o".to_string(),
            output.display().to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        // Keep references that start with '-' from being read as options.
        args.push("--".to_string());
        args.push(reference.as_str().to_string());
        args
    }

    fn timeout(&self) -> Option<Duration> {
        (self.config.timeout_secs > 0).then(|| Duration::from_secs(self.config.timeout_secs))
    }

    /// Whether the configured fetch binary can be launched at all.
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.config.command)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!(command = %self.config.command, version = %version.trim(), "fetch tool is available");
                true
            },
            Ok(output) => {
                warn!(command = %self.config.command, status = %output.status, "fetch tool exited with failure");
                false
            },
            Err(e) => {
                warn!(command = %self.config.command, error = %e, "fetch tool is not available");
                false
            },
        }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        index: usize,
        reference: &Reference,
        stem: &Path,
        max_height: &str,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        let output = stem.with_extension("mp4");
        // The tool skips downloads whose output already exists.
        match tokio::fs::remove_file(&output).await {
            Ok(()) => debug!(path = %output.display(), "removed stale output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                return Err(Error::fetch_failed(format!(
                    "cannot clear {}: {e}",
                    output.display()
                )));
            },
        }
        let args = self.build_args(reference, &output, max_height);
        debug!(index, %reference, command = %self.config.command, ?args, "starting fetch");

        let child = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::fetch_failed(format!("failed to launch {}: {e}", self.config.command)))?;

        // Dropping the wait future on cancel/timeout kills the child.
        let wait = child.wait_with_output();
        let finished = match self.timeout() {
            Some(limit) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                res = tokio::time::timeout(limit, wait) => match res {
                    Ok(res) => res,
                    Err(_) => return Err(Error::fetch_failed(format!(
                        "timed out after {}s", limit.as_secs()
                    ))),
                },
            },
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                res = wait => res,
            },
        };

        let out = finished.map_err(|e| Error::fetch_failed(format!("waiting for fetch tool: {e}")))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let last_line = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output");
            return Err(Error::fetch_failed(format!(
                "{} exited with {}: {}",
                self.config.command,
                out.status,
                last_line.trim()
            )));
        }

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(Error::fetch_failed(format!(
                "fetch tool succeeded but {} is missing",
                output.display()
            )));
        }

        info!(index, %reference, path = %output.display(), "fetch completed");
        Ok(Artifact {
            index,
            path: output,
        })
    }
}
