use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    batchcast_common::types::{ChatType, DocumentRef, MessageHandle},
};

use crate::Result;

/// What the executing bot can do in a resolved chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    pub chat_type: ChatType,
    /// Whether the bot holds the right to post messages there.
    pub can_post: bool,
}

/// One video upload request.
#[derive(Debug, Clone, Copy)]
pub struct VideoUpload<'a> {
    pub path: &'a Path,
    pub caption: &'a str,
    pub thumbnail: Option<&'a Path>,
}

/// Failure classes of a media upload.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The platform asked us to wait before sending again.
    #[error("rate limited, retry after {}s", .0.as_secs())]
    RateLimited(Duration),

    /// Any other failure; the upload is not retried.
    #[error("upload failed: {0}")]
    Transport(String),
}

/// Operations the batch pipeline needs from a messaging platform.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Send a plain text message, returning a handle for later edits.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageHandle>;

    /// Replace the text of a previously sent message.
    async fn edit_text(&self, handle: MessageHandle, text: &str) -> Result<()>;

    /// Download an uploaded document to `dest`.
    async fn download_document(&self, document: &DocumentRef, dest: &Path) -> Result<()>;

    /// Look up a chat and the bot's posting rights in it.
    async fn resolve_endpoint(&self, chat_id: i64) -> Result<EndpointInfo>;

    /// Upload a local video file with caption and streaming metadata.
    async fn send_video(
        &self,
        chat_id: i64,
        upload: VideoUpload<'_>,
    ) -> std::result::Result<(), PublishError>;
}
