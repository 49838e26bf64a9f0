use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    teloxide::types::{ChatKind, MediaKind, Message, MessageKind, PublicChatKind},
    tokio::sync::mpsc::error::TrySendError,
    tracing::{debug, error, info, warn},
};

use {
    batchcast_common::types::{ChatType, DocumentRef, InboundBody, InboundMessage},
    batchcast_pipeline::{SessionInbox, format::GREETING, run_session},
};

use crate::{
    error::Result,
    state::{ActiveSession, BotState},
};

/// Replies buffered per session before further messages are dropped.
const INBOX_CAPACITY: usize = 8;

const ALREADY_RUNNING_MSG: &str =
    "<b>⚠️ A batch is already running in this chat.</b>\nSend /cancel to stop it first.";
const NOTHING_TO_CANCEL_MSG: &str = "<b>No batch is running.</b>";

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Master,
    Cancel,
}

impl Command {
    /// Parse the leading `/command[@bot]` token of `text`.
    ///
    /// Commands addressed to another bot are ignored.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let token = text.split_whitespace().next()?.strip_prefix('/')?;
        let (name, target) = match token.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (token, None),
        };
        if let (Some(target), Some(me)) = (target, bot_username)
            && !target.eq_ignore_ascii_case(me)
        {
            return None;
        }
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "master" => Some(Self::Master),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Handle one inbound message or channel post. Never waits on a session.
pub async fn handle_message(msg: Message, state: &BotState) -> Result<()> {
    let inbound = to_inbound(&msg);
    let chat_id = inbound.chat_id;

    let command = inbound
        .as_text()
        .and_then(|text| Command::parse(text, state.bot_username.as_deref()));
    let Some(command) = command else {
        forward_to_session(state, inbound);
        return Ok(());
    };

    debug!(chat_id, ?command, chat_type = %classify_chat(&msg), "command received");
    match command {
        Command::Start => {
            state.ctx.transport.send_text(chat_id, GREETING).await?;
        },
        Command::Master => start_session(state, chat_id).await?,
        Command::Cancel => cancel_session(state, chat_id).await?,
    }
    Ok(())
}

async fn start_session(state: &BotState, chat_id: i64) -> Result<()> {
    let started = {
        let mut sessions = state.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&chat_id) {
            None
        } else {
            let (tx, inbox) =
                SessionInbox::channel(INBOX_CAPACITY, state.ctx.settings.prompt_timeout);
            let cancel = state.shutdown.child_token();
            let id = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
            sessions.insert(chat_id, ActiveSession {
                id,
                inbox: tx,
                cancel: cancel.clone(),
            });
            Some((id, inbox, cancel))
        }
    };

    let Some((id, mut inbox, cancel)) = started else {
        info!(chat_id, "refusing second concurrent batch");
        state
            .ctx
            .transport
            .send_text(chat_id, ALREADY_RUNNING_MSG)
            .await?;
        return Ok(());
    };

    let ctx = state.ctx.clone();
    let sessions = Arc::clone(&state.sessions);
    state.tasks.spawn(async move {
        info!(chat_id, session_id = id, "batch session started");
        let worker = tokio::spawn(async move {
            run_session(&ctx, chat_id, &mut inbox, &cancel).await;
        });
        if let Err(e) = worker.await {
            error!(chat_id, session_id = id, error = %e, "batch session task failed");
        }

        let mut sessions = sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.get(&chat_id).is_some_and(|s| s.id == id) {
            sessions.remove(&chat_id);
        }
        debug!(chat_id, session_id = id, "batch session released");
    });
    Ok(())
}

async fn cancel_session(state: &BotState, chat_id: i64) -> Result<()> {
    let found = {
        let sessions = state.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(&chat_id).map(|s| s.cancel.cancel()).is_some()
    };
    if found {
        // The session itself reports the cancellation.
        info!(chat_id, "batch cancel requested");
    } else {
        state
            .ctx
            .transport
            .send_text(chat_id, NOTHING_TO_CANCEL_MSG)
            .await?;
    }
    Ok(())
}

fn forward_to_session(state: &BotState, message: InboundMessage) {
    let chat_id = message.chat_id;
    let sessions = state.sessions.lock().unwrap_or_else(|e| e.into_inner());
    let Some(active) = sessions.get(&chat_id) else {
        debug!(chat_id, "no active session, ignoring message");
        return;
    };
    match active.inbox.try_send(message) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => warn!(chat_id, "session inbox full, dropping message"),
        Err(TrySendError::Closed(_)) => debug!(chat_id, "session already finished"),
    }
}

/// Convert a Telegram message into the platform-neutral inbound shape.
pub fn to_inbound(msg: &Message) -> InboundMessage {
    let body = match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => InboundBody::Text {
                text: t.text.clone(),
            },
            MediaKind::Document(d) => InboundBody::Document {
                document: DocumentRef {
                    file_id: d.document.file.id.clone(),
                    file_name: d.document.file_name.clone(),
                },
            },
            _ => InboundBody::Other,
        },
        _ => InboundBody::Other,
    };
    InboundMessage {
        chat_id: msg.chat.id.0,
        sender_id: msg.from.as_ref().map(|u| u.id.0),
        body,
    }
}

/// Classify the chat type.
pub fn classify_chat(msg: &Message) -> ChatType {
    match msg.chat.kind {
        ChatKind::Private(_) => ChatType::Dm,
        ChatKind::Public(ref p) => match p.kind {
            PublicChatKind::Channel(_) => ChatType::Channel,
            _ => ChatType::Group,
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        batchcast_channels::{ChannelTransport, EndpointInfo, PublishError, VideoUpload},
        batchcast_common::types::MessageHandle,
        batchcast_config::BatchcastConfig,
        batchcast_pipeline::{
            Artifact, Fetcher, PipelineContext, PipelineSettings, Reference,
            Result as PipelineResult,
        },
        rstest::rstest,
        serde_json::json,
        std::{path::Path, sync::Mutex, time::Duration},
        tokio_util::sync::CancellationToken,
    };

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl RecordingTransport {
        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ChannelTransport for RecordingTransport {
        async fn send_text(
            &self,
            chat_id: i64,
            text: &str,
        ) -> batchcast_channels::Result<MessageHandle> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(MessageHandle {
                chat_id,
                message_id: 1,
            })
        }

        async fn edit_text(&self, _: MessageHandle, _: &str) -> batchcast_channels::Result<()> {
            Ok(())
        }

        async fn download_document(
            &self,
            _: &DocumentRef,
            _: &Path,
        ) -> batchcast_channels::Result<()> {
            Err(batchcast_channels::Error::not_found("document"))
        }

        async fn resolve_endpoint(&self, chat_id: i64) -> batchcast_channels::Result<EndpointInfo> {
            Err(batchcast_channels::Error::not_found(chat_id))
        }

        async fn send_video(
            &self,
            _: i64,
            _: VideoUpload<'_>,
        ) -> std::result::Result<(), PublishError> {
            Ok(())
        }
    }

    struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch(
            &self,
            _: usize,
            _: &Reference,
            _: &Path,
            _: &str,
            _: &CancellationToken,
        ) -> PipelineResult<Artifact> {
            Err(batchcast_pipeline::Error::fetch_failed("disabled"))
        }
    }

    fn state(transport: Arc<RecordingTransport>) -> BotState {
        let mut cfg = BatchcastConfig::default();
        cfg.telegram.allowlist = vec!["42".into()];
        let ctx = PipelineContext::new(
            transport,
            Arc::new(NoFetch),
            PipelineSettings::from_config(&cfg),
        );
        BotState::new(
            teloxide::Bot::new("test-token"),
            Some("batch_bot".into()),
            ctx,
            CancellationToken::new(),
        )
    }

    fn text_message(chat_id: i64, text: &str) -> Message {
        serde_json::from_value(json!({
            "message_id": 1,
            "date": 1,
            "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
            "from": { "id": chat_id, "is_bot": false, "first_name": "Alice" },
            "text": text
        }))
        .expect("deserialize text message")
    }

    async fn wait_for_release(state: &BotState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.active_sessions() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session released");
    }

    #[rstest]
    #[case("/start", Some(Command::Start))]
    #[case("/master", Some(Command::Master))]
    #[case("/MASTER extra words", Some(Command::Master))]
    #[case("/cancel@batch_bot", Some(Command::Cancel))]
    #[case("/cancel@Batch_Bot", Some(Command::Cancel))]
    #[case("/master@other_bot", None)]
    #[case("/d", None)]
    #[case("master", None)]
    #[case("", None)]
    fn parses_commands(#[case] text: &str, #[case] expected: Option<Command>) {
        assert_eq!(Command::parse(text, Some("batch_bot")), expected);
    }

    #[test]
    fn document_message_converts_to_document_body() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 1,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
            "document": {
                "file_id": "doc-file-id",
                "file_unique_id": "doc-unique-id",
                "file_name": "links.txt",
                "mime_type": "text/plain",
                "file_size": 64
            }
        }))
        .expect("deserialize document message");

        let inbound = to_inbound(&msg);
        assert_eq!(inbound.chat_id, 42);
        assert_eq!(inbound.sender_id, Some(1001));
        assert_eq!(inbound.body, InboundBody::Document {
            document: DocumentRef {
                file_id: "doc-file-id".into(),
                file_name: Some("links.txt".into()),
            },
        });
    }

    #[test]
    fn channel_post_is_classified_as_channel() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 5,
            "date": 1,
            "chat": { "id": -100_123, "type": "channel", "title": "News" },
            "text": "/master"
        }))
        .expect("deserialize channel post");

        assert_eq!(classify_chat(&msg), ChatType::Channel);
        let inbound = to_inbound(&msg);
        assert_eq!(inbound.sender_id, None);
        assert_eq!(inbound.as_text(), Some("/master"));
    }

    #[tokio::test]
    async fn second_master_is_refused_while_active() {
        let transport = Arc::new(RecordingTransport::default());
        let state = state(Arc::clone(&transport));

        handle_message(text_message(42, "/master"), &state).await.unwrap();
        assert_eq!(state.active_sessions(), 1);
        handle_message(text_message(42, "/master"), &state).await.unwrap();

        assert!(
            transport
                .texts()
                .iter()
                .any(|t| t.contains("already running"))
        );

        handle_message(text_message(42, "/cancel"), &state).await.unwrap();
        wait_for_release(&state).await;
        assert!(transport.texts().iter().any(|t| t.contains("Batch cancelled")));
    }

    #[tokio::test]
    async fn shutdown_waits_for_session_summary() {
        let transport = Arc::new(RecordingTransport::default());
        let state = state(Arc::clone(&transport));

        handle_message(text_message(42, "/master"), &state).await.unwrap();
        state.shutdown.cancel();

        assert!(state.drain(Duration::from_secs(5)).await);
        assert_eq!(state.active_sessions(), 0);
        assert!(transport.texts().iter().any(|t| t.contains("Batch cancelled")));
    }

    #[tokio::test]
    async fn replies_reach_the_session() {
        let transport = Arc::new(RecordingTransport::default());
        let state = state(Arc::clone(&transport));

        handle_message(text_message(42, "/master"), &state).await.unwrap();
        // blank links message ends the session with an input error
        handle_message(text_message(42, " "), &state).await.unwrap();

        wait_for_release(&state).await;
        assert!(
            transport
                .texts()
                .iter()
                .any(|t| t.contains("No valid links found"))
        );
    }

    #[tokio::test]
    async fn unauthorized_master_is_rejected_and_released() {
        let transport = Arc::new(RecordingTransport::default());
        let state = state(Arc::clone(&transport));

        handle_message(text_message(7, "/master"), &state).await.unwrap();

        wait_for_release(&state).await;
        assert!(transport.texts().iter().any(|t| t.contains("Your ID: <code>7</code>")));
    }

    #[tokio::test]
    async fn cancel_without_session_replies() {
        let transport = Arc::new(RecordingTransport::default());
        let state = state(Arc::clone(&transport));

        handle_message(text_message(42, "/cancel"), &state).await.unwrap();

        assert_eq!(transport.texts(), vec![NOTHING_TO_CANCEL_MSG.to_string()]);
    }

    #[tokio::test]
    async fn start_sends_greeting() {
        let transport = Arc::new(RecordingTransport::default());
        let state = state(Arc::clone(&transport));

        handle_message(text_message(42, "/start"), &state).await.unwrap();

        assert_eq!(transport.texts(), vec![GREETING.to_string()]);
        assert_eq!(state.active_sessions(), 0);
    }
}
