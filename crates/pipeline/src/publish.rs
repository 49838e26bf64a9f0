//! Publish step: upload one artifact, honoring rate-limit signals.

use std::{path::PathBuf, time::Duration};

use {
    batchcast_channels::{ChannelTransport, PublishError, VideoUpload},
    batchcast_config::RateLimitPolicy,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, warn},
};

use crate::acquire::Artifact;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { waited: Option<Duration> },
    /// Rate limited and not (or no longer) retried.
    RateLimited { waited: Duration },
    /// Failed for a reason other than rate limiting.
    Abandoned { reason: String },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Publisher {
    pub policy: RateLimitPolicy,
    pub remove_abandoned: bool,
    pub thumbnail: Option<PathBuf>,
}

impl Publisher {
    /// Upload `artifact` to `destination`.
    ///
    /// A rate-limit answer is always waited out before returning, so the next
    /// item never starts early. The local file is deleted after a successful
    /// upload and, when configured, after an abandoned one.
    pub async fn publish(
        &self,
        transport: &dyn ChannelTransport,
        destination: i64,
        artifact: Artifact,
        caption: &str,
        cancel: &CancellationToken,
    ) -> PublishOutcome {
        let upload = VideoUpload {
            path: &artifact.path,
            caption,
            thumbnail: self.thumbnail.as_deref(),
        };
        let attempts = match self.policy {
            RateLimitPolicy::RetryOnce => 2,
            RateLimitPolicy::WaitOnly => 1,
        };

        let mut waited = Duration::ZERO;
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match transport.send_video(destination, upload).await {
                Ok(()) => {
                    break PublishOutcome::Published {
                        waited: (!waited.is_zero()).then_some(waited),
                    };
                },
                Err(PublishError::RateLimited(wait)) => {
                    warn!(
                        index = artifact.index,
                        destination,
                        wait_secs = wait.as_secs(),
                        attempt,
                        "rate limited by destination, waiting"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break PublishOutcome::Cancelled,
                        _ = tokio::time::sleep(wait) => {},
                    }
                    waited += wait;
                    if attempt >= attempts {
                        break PublishOutcome::RateLimited { waited };
                    }
                },
                Err(PublishError::Transport(reason)) => {
                    error!(index = artifact.index, destination, %reason, "upload failed");
                    break PublishOutcome::Abandoned { reason };
                },
            }
        };

        let remove = match &outcome {
            PublishOutcome::Published { .. } => true,
            _ => self.remove_abandoned,
        };
        if remove {
            release(artifact).await;
        } else {
            debug!(path = %artifact.path.display(), "keeping unpublished artifact");
        }
        outcome
    }
}

async fn release(artifact: Artifact) {
    if let Err(e) = tokio::fs::remove_file(&artifact.path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %artifact.path.display(), error = %e, "failed to remove artifact");
    }
}
