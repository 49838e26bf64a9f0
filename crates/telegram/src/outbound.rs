use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        payloads::{EditMessageTextSetters, SendMessageSetters, SendVideoSetters},
        prelude::*,
        types::{ChatId, InputFile, MessageId, ParseMode, UserId},
    },
    tracing::{debug, warn},
};

use {
    batchcast_channels::{ChannelTransport, EndpointInfo, Error, PublishError, Result, VideoUpload},
    batchcast_common::types::{ChatType, DocumentRef, MessageHandle},
};

/// [`ChannelTransport`] over the Telegram Bot API.
///
/// Text is always sent with HTML parse mode.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    bot_user_id: UserId,
    http: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot: Bot, bot_user_id: UserId) -> Self {
        Self {
            bot,
            bot_user_id,
            http: reqwest::Client::new(),
        }
    }

    /// File download URL: `<api>/file/bot<token>/<path>`.
    fn file_url(&self, file_path: &str) -> Result<reqwest::Url> {
        self.bot
            .api_url()
            .join(&format!("file/bot{}/{}", self.bot.token(), file_path))
            .map_err(|e| Error::external("build file url", e))
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

fn is_not_found_error(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound)
    )
}

fn publish_error(error: RequestError) -> PublishError {
    match retry_after_duration(&error) {
        Some(wait) => PublishError::RateLimited(wait),
        None => PublishError::Transport(error.to_string()),
    }
}

#[async_trait]
impl ChannelTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageHandle> {
        let message = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| Error::external("send message", e))?;
        Ok(MessageHandle {
            chat_id,
            message_id: message.id.0,
        })
    }

    async fn edit_text(&self, handle: MessageHandle, text: &str) -> Result<()> {
        match self
            .bot
            .edit_message_text(ChatId(handle.chat_id), MessageId(handle.message_id), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => {
                debug!(chat_id = handle.chat_id, "prompt unchanged, edit skipped");
                Ok(())
            },
            Err(e) => Err(Error::external("edit message", e)),
        }
    }

    async fn download_document(&self, document: &DocumentRef, dest: &Path) -> Result<()> {
        let file = self
            .bot
            .get_file(&document.file_id)
            .await
            .map_err(|e| Error::external("get file", e))?;

        let response = self
            .http
            .get(self.file_url(&file.path)?)
            .send()
            .await
            .map_err(|e| Error::external("download file", e))?;
        if !response.status().is_success() {
            return Err(Error::rejected(format!(
                "file download returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::external("read file body", e))?;
        tokio::fs::write(dest, &bytes).await?;
        debug!(
            file_name = ?document.file_name,
            size = bytes.len(),
            "downloaded document"
        );
        Ok(())
    }

    async fn resolve_endpoint(&self, chat_id: i64) -> Result<EndpointInfo> {
        let chat = self
            .bot
            .get_chat(ChatId(chat_id))
            .await
            .map_err(|e| {
                if is_not_found_error(&e) {
                    Error::not_found(format!("chat {chat_id}"))
                } else {
                    Error::external("get chat", e)
                }
            })?;

        let chat_type = if chat.is_channel() {
            ChatType::Channel
        } else if chat.is_private() {
            ChatType::Dm
        } else {
            ChatType::Group
        };

        let can_post = match self
            .bot
            .get_chat_member(ChatId(chat_id), self.bot_user_id)
            .await
        {
            Ok(member) => member.kind.can_post_messages(),
            Err(e) => {
                warn!(chat_id, error = %e, "could not read bot membership");
                false
            },
        };

        Ok(EndpointInfo {
            chat_type,
            can_post,
        })
    }

    async fn send_video(
        &self,
        chat_id: i64,
        upload: VideoUpload<'_>,
    ) -> std::result::Result<(), PublishError> {
        let mut request = self
            .bot
            .send_video(ChatId(chat_id), InputFile::file(upload.path.to_path_buf()))
            .caption(upload.caption)
            .parse_mode(ParseMode::Html)
            .supports_streaming(true);
        if let Some(thumb) = upload.thumbnail {
            request = request.thumbnail(InputFile::file(thumb.to_path_buf()));
        }
        request.await.map(|_| ()).map_err(publish_error)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
        serde_json::{Value, json},
        std::sync::{Arc, Mutex},
        tokio::sync::oneshot,
    };

    #[test]
    fn retry_after_duration_extracts_wait() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(retry_after_duration(&err), Some(Duration::from_secs(42)));
    }

    #[test]
    fn retry_after_maps_to_rate_limited() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(9));
        assert!(matches!(
            publish_error(err),
            PublishError::RateLimited(d) if d == Duration::from_secs(9)
        ));
    }

    #[test]
    fn api_errors_map_to_transport() {
        let err = RequestError::Api(ApiError::MessageNotModified);
        assert!(matches!(publish_error(err), PublishError::Transport(_)));
    }

    #[test]
    fn message_not_modified_is_detected() {
        assert!(is_message_not_modified_error(&RequestError::Api(
            ApiError::MessageNotModified
        )));
        assert!(!is_message_not_modified_error(&RequestError::Api(
            ApiError::ChatNotFound
        )));
    }

    /// Minimal Bot API stand-in: records method names and answers from a script.
    #[derive(Clone)]
    struct MockTelegramApi {
        methods: Arc<Mutex<Vec<String>>>,
        send_video_reply: Value,
    }

    fn message_json(chat_id: i64, chat_type: &str) -> Value {
        let chat = if chat_type == "private" {
            json!({ "id": chat_id, "type": "private", "first_name": "Alice" })
        } else {
            json!({ "id": chat_id, "type": chat_type, "title": "News" })
        };
        json!({
            "message_id": 7,
            "date": 0,
            "chat": chat,
            "text": "ok"
        })
    }

    async fn telegram_api_handler(
        State(state): State<MockTelegramApi>,
        uri: Uri,
        _body: Bytes,
    ) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        state.methods.lock().expect("lock methods").push(method.clone());
        let reply = match method.as_str() {
            "SendMessage" => json!({ "ok": true, "result": message_json(42, "private") }),
            "SendVideo" => state.send_video_reply.clone(),
            "GetChat" => json!({
                "ok": true,
                "result": { "id": -100_123, "type": "channel", "title": "News" }
            }),
            "GetChatMember" => json!({
                "ok": true,
                "result": {
                    "status": "administrator",
                    "user": { "id": 1, "is_bot": true, "first_name": "bot" },
                    "can_be_edited": false,
                    "is_anonymous": false,
                    "can_manage_chat": true,
                    "can_delete_messages": true,
                    "can_manage_video_chats": false,
                    "can_restrict_members": false,
                    "can_promote_members": false,
                    "can_change_info": false,
                    "can_invite_users": true,
                    "can_post_messages": true,
                    "can_edit_messages": true,
                    "can_pin_messages": false,
                    "can_manage_topics": false,
                    "can_post_stories": false,
                    "can_edit_stories": false,
                    "can_delete_stories": false
                }
            }),
            _ => json!({ "ok": true, "result": true }),
        };
        Json(reply)
    }

    async fn serve(
        send_video_reply: Value,
    ) -> (TelegramTransport, Arc<Mutex<Vec<String>>>, oneshot::Sender<()>) {
        let methods = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(MockTelegramApi {
                methods: Arc::clone(&methods),
                send_video_reply,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        let bot = Bot::new("test-token").set_api_url(api_url);
        (TelegramTransport::new(bot, UserId(1)), methods, shutdown_tx)
    }

    #[tokio::test]
    async fn send_text_returns_handle() {
        let (transport, methods, shutdown) = serve(json!({ "ok": true, "result": true })).await;

        let handle = transport.send_text(42, "<b>hi</b>").await.unwrap();

        assert_eq!(handle, MessageHandle {
            chat_id: 42,
            message_id: 7
        });
        assert_eq!(methods.lock().unwrap().as_slice(), ["SendMessage"]);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn resolve_endpoint_reads_channel_rights() {
        let (transport, _methods, shutdown) = serve(json!({ "ok": true, "result": true })).await;

        let info = transport.resolve_endpoint(-100_123).await.unwrap();

        assert_eq!(info, EndpointInfo {
            chat_type: ChatType::Channel,
            can_post: true
        });
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn send_video_surfaces_rate_limit() {
        let (transport, methods, shutdown) = serve(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 12",
            "parameters": { "retry_after": 12 }
        }))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001_video.mp4");
        std::fs::write(&path, b"video").unwrap();

        let err = transport
            .send_video(-100_123, VideoUpload {
                path: &path,
                caption: "<b>📹 Video 1</b>",
                thumbnail: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::RateLimited(d) if d == Duration::from_secs(12)));
        assert_eq!(methods.lock().unwrap().as_slice(), ["SendVideo"]);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn send_video_success() {
        let (transport, _methods, shutdown) = serve(json!({
            "ok": true,
            "result": message_json(-100_123, "channel")
        }))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001_video.mp4");
        std::fs::write(&path, b"video").unwrap();

        transport
            .send_video(-100_123, VideoUpload {
                path: &path,
                caption: "cap",
                thumbnail: None,
            })
            .await
            .unwrap();
        let _ = shutdown.send(());
    }
}
