//! In-memory transport and fetcher used by the pipeline tests.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    batchcast_channels::{Allowlist, ChannelTransport, EndpointInfo, PublishError, VideoUpload},
    batchcast_common::types::{DocumentRef, MessageHandle},
    batchcast_config::RateLimitPolicy,
    tokio_util::sync::CancellationToken,
};

use crate::{
    acquire::{Artifact, Fetcher},
    batch::Reference,
    context::{PipelineContext, PipelineSettings},
    error::{Error, Result},
};

#[derive(Debug, Clone)]
pub struct RecordedVideo {
    pub chat_id: i64,
    pub path: PathBuf,
    pub caption: String,
    pub thumbnail: Option<PathBuf>,
    /// File content at upload time, or `None` if the file was gone.
    pub content: Option<String>,
}

#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicI32,
    sent: Mutex<Vec<(i64, String)>>,
    edits: Mutex<Vec<String>>,
    videos: Mutex<Vec<RecordedVideo>>,
    video_results: Mutex<VecDeque<std::result::Result<(), PublishError>>>,
    endpoints: Mutex<HashMap<i64, EndpointInfo>>,
    documents: Mutex<HashMap<String, String>>,
}

impl MockTransport {
    /// Answer successive uploads with `results`; uploads beyond the list succeed.
    pub fn with_video_results(results: Vec<std::result::Result<(), PublishError>>) -> Self {
        let t = Self::default();
        *t.video_results.lock().unwrap() = results.into();
        t
    }

    pub fn set_endpoint(&self, chat_id: i64, info: EndpointInfo) {
        self.endpoints.lock().unwrap().insert(chat_id, info);
    }

    pub fn set_document(&self, file_id: &str, content: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(file_id.to_string(), content.to_string());
    }

    pub fn sent_texts(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }

    pub fn videos(&self) -> Vec<RecordedVideo> {
        self.videos.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> batchcast_channels::Result<MessageHandle> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(MessageHandle {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
        })
    }

    async fn edit_text(&self, _handle: MessageHandle, text: &str) -> batchcast_channels::Result<()> {
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn download_document(
        &self,
        document: &DocumentRef,
        dest: &Path,
    ) -> batchcast_channels::Result<()> {
        let content = self
            .documents
            .lock()
            .unwrap()
            .get(&document.file_id)
            .cloned()
            .ok_or_else(|| batchcast_channels::Error::not_found(&document.file_id))?;
        tokio::fs::write(dest, content).await?;
        Ok(())
    }

    async fn resolve_endpoint(&self, chat_id: i64) -> batchcast_channels::Result<EndpointInfo> {
        self.endpoints
            .lock()
            .unwrap()
            .get(&chat_id)
            .copied()
            .ok_or_else(|| batchcast_channels::Error::not_found(format!("chat {chat_id}")))
    }

    async fn send_video(
        &self,
        chat_id: i64,
        upload: VideoUpload<'_>,
    ) -> std::result::Result<(), PublishError> {
        let content = tokio::fs::read_to_string(upload.path).await.ok();
        self.videos.lock().unwrap().push(RecordedVideo {
            chat_id,
            path: upload.path.to_path_buf(),
            caption: upload.caption.to_string(),
            thumbnail: upload.thumbnail.map(Path::to_path_buf),
            content,
        });
        self.video_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[derive(Debug, Clone)]
pub enum FetchBehavior {
    Succeed,
    Fail,
    Panic,
    /// Produce the file, then fire the token as if the caller sent `/cancel`.
    SucceedThenCancel(CancellationToken),
}

/// Fetcher that writes the reference itself into the output file instead of
/// downloading.
pub struct MockFetcher {
    behaviors: Vec<FetchBehavior>,
    delay: Duration,
    calls: Mutex<Vec<(usize, String, String)>>,
}

impl MockFetcher {
    /// `behaviors[i]` applies to item `i + 1`; missing entries succeed.
    pub fn new(behaviors: Vec<FetchBehavior>) -> Self {
        Self {
            behaviors,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeed() -> Self {
        Self::new(Vec::new())
    }

    /// Succeeds, but only after sleeping `delay` with the file already written.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::always_succeed()
        }
    }

    /// `(index, reference, max_height)` of every fetch, in call order.
    pub fn calls(&self) -> Vec<(usize, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        index: usize,
        reference: &Reference,
        stem: &Path,
        max_height: &str,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        self.calls.lock().unwrap().push((
            index,
            reference.as_str().to_string(),
            max_height.to_string(),
        ));
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let behavior = self
            .behaviors
            .get(index - 1)
            .cloned()
            .unwrap_or(FetchBehavior::Succeed);
        let path = stem.with_extension("mp4");
        match behavior {
            FetchBehavior::Fail => Err(Error::fetch_failed("HTTP Error 404")),
            FetchBehavior::Panic => panic!("mock fetch panic"),
            FetchBehavior::Succeed => {
                tokio::fs::write(&path, reference.as_str()).await?;
                tokio::time::sleep(self.delay).await;
                Ok(Artifact { index, path })
            },
            FetchBehavior::SucceedThenCancel(token) => {
                tokio::fs::write(&path, reference.as_str()).await?;
                token.cancel();
                Ok(Artifact { index, path })
            },
        }
    }
}

/// Context over the mocks with caller 42 allowed and `work_dir` as scratch space.
pub fn test_context(
    work_dir: &Path,
    transport: Arc<MockTransport>,
    fetcher: Arc<MockFetcher>,
) -> PipelineContext {
    let settings = PipelineSettings {
        allowlist: Allowlist::new(["42"]),
        attribution: "batchcast".into(),
        default_label: "Batch".into(),
        prompt_timeout: Duration::from_secs(300),
        work_dir: work_dir.to_path_buf(),
        rate_limit_policy: RateLimitPolicy::RetryOnce,
        remove_abandoned_artifacts: true,
        thumbnail: None,
    };
    PipelineContext::new(transport, fetcher, settings)
}
