use std::{sync::Arc, time::Duration};

use {
    batchcast_config::TelegramConfig,
    batchcast_pipeline::{Fetcher, PipelineContext, PipelineSettings},
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{error::Result, handlers, outbound::TelegramTransport, state::BotState};

/// Long-polling window passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// How long shutdown waits for sessions to send their final message.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Show what this bot does"),
        BotCommand::new("master", "Start a new batch"),
        BotCommand::new("cancel", "Stop the running batch"),
    ]
}

/// Connect the bot and start the update polling loop.
///
/// The returned task runs until `shutdown` is cancelled or another instance
/// takes over the token; every active session is cancelled with it.
pub async fn start_polling(
    config: &TelegramConfig,
    settings: PipelineSettings,
    fetcher: Arc<dyn Fetcher>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    // Client timeout must outlast the long-polling window.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(config.client_timeout_secs))
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");

    let transport = Arc::new(TelegramTransport::new(bot.clone(), me.id));
    let ctx = PipelineContext::new(transport, fetcher, settings);
    let state = BotState::new(bot, bot_username, ctx, shutdown);

    Ok(tokio::spawn(poll_updates(state)))
}

async fn poll_updates(state: BotState) {
    info!("starting telegram manual polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => break,
            result = state
                .bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let msg = match update.kind {
                        UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => msg,
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                            continue;
                        },
                    };
                    let chat_id = msg.chat.id.0;
                    if let Err(e) = handlers::handle_message(msg, &state).await {
                        error!(chat_id, error = %e, "error handling telegram message");
                    }
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                error!("telegram polling stopped: another instance is already running with this token");
                state.shutdown.cancel();
                break;
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    _ = state.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {},
                }
            },
        }
    }

    info!(active_sessions = state.active_sessions(), "telegram polling stopped");
    if !state.drain(SHUTDOWN_GRACE).await {
        warn!(
            active_sessions = state.active_sessions(),
            "sessions still running after shutdown grace period"
        );
    }
}
