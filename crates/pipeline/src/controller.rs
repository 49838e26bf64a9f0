//! Async driver for the conversation state machine.

use std::panic::AssertUnwindSafe;

use {
    batchcast_common::types::{InboundBody, MessageHandle},
    futures::FutureExt,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    batch::run_batch,
    context::PipelineContext,
    error::Error,
    gate, input,
    inbox::SessionInbox,
    report::SessionOutcome,
    session::{Effect, Prompt, SessionEvent, SessionParams, SessionState},
};

/// Run one `/master` conversation in `chat_id` to completion.
///
/// The caller is checked against the allowlist before anything is prompted.
/// Exactly one final message (summary or error) is sent, whatever happens.
pub async fn run_session(
    ctx: &PipelineContext,
    chat_id: i64,
    inbox: &mut SessionInbox,
    cancel: &CancellationToken,
) -> SessionOutcome {
    let outcome = match gate::check_caller(&ctx.settings.allowlist, chat_id) {
        Ok(()) => {
            match AssertUnwindSafe(drive(ctx, chat_id, inbox, cancel))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(chat_id, "session driver panicked");
                    SessionOutcome::Aborted(Error::message("internal error, batch aborted"))
                },
            }
        },
        Err(e) => SessionOutcome::Aborted(e),
    };

    match &outcome {
        SessionOutcome::Completed(report) => info!(
            chat_id,
            published = report.published(),
            failed = report.failed(),
            "session completed"
        ),
        SessionOutcome::Aborted(err) => info!(chat_id, error = %err, "session aborted"),
    }

    if let Err(e) = ctx
        .transport
        .send_text(chat_id, &outcome.user_message())
        .await
    {
        warn!(chat_id, error = %e, "failed to send final session message");
    }
    outcome
}

async fn drive(
    ctx: &PipelineContext,
    chat_id: i64,
    inbox: &mut SessionInbox,
    cancel: &CancellationToken,
) -> SessionOutcome {
    let params = SessionParams {
        chat_id,
        default_label: ctx.settings.default_label.clone(),
    };
    let mut prompt_handle: Option<MessageHandle> = None;
    let (mut state, mut effect) = SessionState::start();

    loop {
        debug!(chat_id, state = state.name(), "session step");
        let event = match effect {
            Effect::Finish(outcome) => return outcome,
            Effect::Prompt(prompt) => {
                if let Err(e) = show_prompt(ctx, chat_id, &mut prompt_handle, prompt).await {
                    SessionEvent::Failed(e)
                } else {
                    next_event(ctx, &state, inbox, cancel).await
                }
            },
            Effect::CheckDestination(destination) => SessionEvent::DestinationChecked(
                gate::check_destination(ctx.transport.as_ref(), destination).await,
            ),
            Effect::RunBatch(job) => {
                // Progress message only; its failure must not stop the batch.
                if let Err(e) = show_prompt(ctx, chat_id, &mut prompt_handle, Prompt::Starting).await
                {
                    warn!(chat_id, error = %e, "failed to show start message");
                }
                SessionEvent::BatchFinished(run_batch(ctx, &job, cancel).await)
            },
        };
        (state, effect) = state.step(event, &params);
    }
}

/// Send the first prompt, then edit that same message for the following ones.
async fn show_prompt(
    ctx: &PipelineContext,
    chat_id: i64,
    handle: &mut Option<MessageHandle>,
    prompt: Prompt,
) -> crate::Result<()> {
    match handle {
        Some(h) => ctx.transport.edit_text(*h, prompt.text()).await?,
        None => *handle = Some(ctx.transport.send_text(chat_id, prompt.text()).await?),
    }
    Ok(())
}

/// Wait for the caller's reply to the current prompt and turn it into an event.
async fn next_event(
    ctx: &PipelineContext,
    state: &SessionState,
    inbox: &mut SessionInbox,
    cancel: &CancellationToken,
) -> SessionEvent {
    let message = match inbox.next(cancel).await {
        Ok(m) => m,
        Err(e) => return SessionEvent::Failed(e),
    };

    if state.awaits_links() {
        return match input::collect(ctx.transport.as_ref(), &message, &ctx.settings.work_dir).await
        {
            Ok(collected) => SessionEvent::LinksCollected(collected),
            Err(e) => SessionEvent::Failed(e),
        };
    }

    match message.body {
        InboundBody::Text { text } => SessionEvent::Reply(text),
        // Uploads or stickers at a text prompt read as a blank reply.
        _ => SessionEvent::Reply(String::new()),
    }
}
