//! The processing loop: fetch then publish every reference, in order.

use std::{panic::AssertUnwindSafe, path::Path};

use {
    futures::FutureExt,
    serde::{Deserialize, Serialize},
    tempfile::TempDir,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{
    context::PipelineContext,
    error::Error,
    format,
    publish::PublishOutcome,
    report::{BatchReport, ItemOutcome, ItemStatus},
};

/// One source link supplied by the caller. Never empty, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully collected parameters of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub references: Vec<Reference>,
    pub label: String,
    /// Upper bound on vertical resolution, used verbatim (e.g. "720").
    pub quality: String,
    pub destination: i64,
}

/// Run every item of `job` sequentially and collect the outcomes.
///
/// Item `i + 1` starts only after item `i` resolved, so at most one artifact
/// of this batch exists on disk at any time. Artifacts live in a directory of
/// their own under the work dir. No item failure ends the loop; cancellation
/// marks the remaining items as cancelled.
pub async fn run_batch(
    ctx: &PipelineContext,
    job: &BatchJob,
    cancel: &CancellationToken,
) -> BatchReport {
    let mut report = BatchReport::default();
    let total = job.references.len();

    info!(
        destination = job.destination,
        total,
        label = %job.label,
        quality = %job.quality,
        "batch started"
    );

    let scratch = match scratch_dir(&ctx.settings.work_dir, job.destination).await {
        Ok(dir) => Some(dir),
        Err(e) => {
            error!(dir = %ctx.settings.work_dir.display(), error = %e, "could not create batch directory");
            None
        },
    };

    for (i, reference) in job.references.iter().enumerate() {
        let index = i + 1;
        let status = match &scratch {
            _ if cancel.is_cancelled() => ItemStatus::Cancelled,
            None => ItemStatus::Failed {
                reason: "no scratch directory for downloads".into(),
            },
            // A panic inside one item is contained to that item.
            Some(dir) => match AssertUnwindSafe(process_item(
                ctx,
                job,
                index,
                reference,
                dir.path(),
                cancel,
            ))
            .catch_unwind()
            .await
            {
                Ok(status) => status,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(index, %reference, reason, "item processing panicked");
                    ItemStatus::Failed { reason }
                },
            },
        };

        match &status {
            ItemStatus::Published { .. } => info!(index, total, %reference, "item published"),
            ItemStatus::Cancelled => {},
            other => warn!(index, total, %reference, status = ?other, "item not published"),
        }
        report.push(ItemOutcome {
            index,
            reference: reference.clone(),
            status,
        });
    }

    if let Some(dir) = scratch {
        release_scratch(dir, ctx.settings.remove_abandoned_artifacts).await;
    }

    info!(
        destination = job.destination,
        published = report.published(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        "batch finished"
    );
    report
}

async fn process_item(
    ctx: &PipelineContext,
    job: &BatchJob,
    index: usize,
    reference: &Reference,
    work_dir: &Path,
    cancel: &CancellationToken,
) -> ItemStatus {
    let stem = work_dir.join(format::output_name(index));

    let artifact = match ctx
        .fetcher
        .fetch(index, reference, &stem, &job.quality, cancel)
        .await
    {
        Ok(artifact) => artifact,
        Err(Error::Cancelled) => return ItemStatus::Cancelled,
        Err(e) => {
            warn!(index, %reference, error = %e, "fetch failed, skipping item");
            return ItemStatus::FetchFailed {
                reason: e.to_string(),
            };
        },
    };

    let caption = format::caption(
        index,
        &job.label,
        &job.quality,
        &ctx.settings.attribution,
    );

    match ctx
        .publisher()
        .publish(
            ctx.transport.as_ref(),
            job.destination,
            artifact,
            &caption,
            cancel,
        )
        .await
    {
        PublishOutcome::Published { waited } => ItemStatus::Published {
            waited_secs: waited.map(|d| d.as_secs()),
        },
        PublishOutcome::RateLimited { waited } => ItemStatus::RateLimited {
            waited_secs: waited.as_secs(),
        },
        PublishOutcome::Abandoned { reason } => ItemStatus::PublishFailed { reason },
        PublishOutcome::Cancelled => ItemStatus::Cancelled,
    }
}

/// Private directory for one batch's artifacts, so concurrent batches never
/// share file names.
async fn scratch_dir(work_dir: &Path, destination: i64) -> std::io::Result<TempDir> {
    tokio::fs::create_dir_all(work_dir).await?;
    tempfile::Builder::new()
        .prefix(&format!("batch-{destination}-"))
        .tempdir_in(work_dir)
}

/// Remove the batch directory. Unpublished artifacts that were kept on
/// purpose keep their directory too.
async fn release_scratch(dir: TempDir, remove_all: bool) {
    if remove_all {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(dir = %path.display(), error = %e, "failed to remove batch directory");
        }
        return;
    }
    let path = dir.keep();
    if tokio::fs::remove_dir(&path).await.is_ok() {
        return;
    }
    info!(dir = %path.display(), "keeping unpublished artifacts");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected failure".to_string()
    }
}
