//! Input collector: turns a links message or uploaded text file into references.

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use {
    batchcast_channels::ChannelTransport,
    batchcast_common::types::{InboundBody, InboundMessage},
    tracing::{debug, warn},
};

use crate::{
    batch::Reference,
    error::{Error, Result},
};

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// References gathered from the first reply of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedInput {
    pub references: Vec<Reference>,
    /// Original filename when the links arrived as a document.
    pub upload_name: Option<String>,
}

impl CollectedInput {
    /// Upload filename without its extension, if any.
    pub fn upload_stem(&self) -> Option<&str> {
        let name = self.upload_name.as_deref()?;
        let stem = Path::new(name).file_stem()?.to_str()?;
        (!stem.trim().is_empty()).then_some(stem)
    }
}

/// One reference per non-blank line; order and duplicates are kept.
pub fn parse_references(text: &str) -> Vec<Reference> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Reference::new)
        .collect()
}

/// Extract references from `message`.
///
/// An uploaded document is staged in `work_dir` and removed again before
/// this returns, whatever the outcome.
pub async fn collect(
    transport: &dyn ChannelTransport,
    message: &InboundMessage,
    work_dir: &Path,
) -> Result<CollectedInput> {
    let (text, upload_name) = match &message.body {
        InboundBody::Text { text } => (text.clone(), None),
        InboundBody::Document { document } => {
            tokio::fs::create_dir_all(work_dir).await?;
            let staged = work_dir.join(format!(
                "upload-{}-{}.txt",
                message.chat_id.unsigned_abs(),
                UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed)
            ));
            let read = read_document(transport, document, &staged).await;
            remove_staged(&staged).await;
            (read?, document.file_name.clone())
        },
        InboundBody::Other => (String::new(), None),
    };

    let references = parse_references(&text);
    debug!(chat_id = message.chat_id, count = references.len(), "collected references");
    if references.is_empty() {
        return Err(Error::EmptyInput);
    }
    Ok(CollectedInput {
        references,
        upload_name,
    })
}

async fn read_document(
    transport: &dyn ChannelTransport,
    document: &batchcast_common::types::DocumentRef,
    staged: &Path,
) -> Result<String> {
    transport.download_document(document, staged).await?;
    let bytes = tokio::fs::read(staged).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove uploaded links file");
    }
}
