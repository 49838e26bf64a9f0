use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    batchcast_common::types::InboundMessage,
    batchcast_pipeline::PipelineContext,
    tokio::sync::mpsc,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
};

/// Active sessions keyed by chat id. At most one per chat.
pub type SessionMap = Arc<Mutex<HashMap<i64, ActiveSession>>>;

/// Handle the dispatcher keeps for a running `/master` conversation.
pub struct ActiveSession {
    /// Distinguishes a finished session from a newer one in the same chat.
    pub id: u64,
    pub inbox: mpsc::Sender<InboundMessage>,
    pub cancel: CancellationToken,
}

/// Runtime state shared by the polling loop and the update handlers.
///
/// `sessions` uses `std::sync::Mutex`: it is never held across `.await`.
#[derive(Clone)]
pub struct BotState {
    pub bot: teloxide::Bot,
    pub bot_username: Option<String>,
    pub ctx: PipelineContext,
    pub sessions: SessionMap,
    /// Parent of every session token; cancelled on shutdown.
    pub shutdown: CancellationToken,
    /// Session tasks, awaited on shutdown so final summaries go out.
    pub tasks: TaskTracker,
}

impl BotState {
    pub fn new(
        bot: teloxide::Bot,
        bot_username: Option<String>,
        ctx: PipelineContext,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bot,
            bot_username,
            ctx,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Stop accepting sessions and wait up to `grace` for running ones to
    /// finish. Returns `false` if some were still running.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        tokio::time::timeout(grace, self.tasks.wait()).await.is_ok()
    }
}
