//! Batch conversation state machine.
//!
//! [`SessionState::step`] is a pure transition function: it never touches the
//! network, the filesystem, or the clock. The driver in
//! [`crate::controller`] performs the returned [`Effect`] and feeds the
//! result back as the next [`SessionEvent`].

use crate::{
    batch::{BatchJob, Reference},
    error::Error,
    input::CollectedInput,
    report::{BatchReport, SessionOutcome},
};

/// Reply meaning "use the default" at the label and destination prompts.
pub const DEFAULT_TOKEN: &str = "/d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Links,
    Label,
    Quality,
    Destination,
    Starting,
}

impl Prompt {
    pub fn text(self) -> &'static str {
        match self {
            Self::Links => "<b>📄 Send a TXT file or links (one per line):</b>",
            Self::Label => "<b>🏷 Enter batch name (or /d for file name):</b>",
            Self::Quality => "<b>🎞 Enter resolution (e.g. 720):</b>",
            Self::Destination => "<b>📢 Enter channel ID (or /d for this chat):</b>",
            Self::Starting => "<b>⏳ Starting downloads...</b>",
        }
    }
}

/// Per-session constants the transitions depend on.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Conversation the session runs in; `/d` destination resolves to it.
    pub chat_id: i64,
    pub default_label: String,
}

#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    CollectingLinks,
    CollectingLabel {
        input: CollectedInput,
    },
    CollectingQuality {
        references: Vec<Reference>,
        label: String,
    },
    CollectingDestination {
        references: Vec<Reference>,
        label: String,
        quality: String,
    },
    Authorizing {
        job: BatchJob,
    },
    Processing,
    Done,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// The first reply was turned into references.
    LinksCollected(CollectedInput),
    /// A text reply to the label, quality, or destination prompt.
    Reply(String),
    DestinationChecked(Result<(), Error>),
    BatchFinished(BatchReport),
    /// Any session-scoped failure (timeout, cancel, empty input, ...).
    Failed(Error),
}

#[derive(Debug)]
pub enum Effect {
    Prompt(Prompt),
    CheckDestination(i64),
    RunBatch(BatchJob),
    Finish(SessionOutcome),
}

impl SessionState {
    /// Initial state and the effect that opens the conversation.
    pub fn start() -> (Self, Effect) {
        (Self::CollectingLinks, Effect::Prompt(Prompt::Links))
    }

    #[cfg(test)]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether the next event must come from the caller's first reply.
    pub fn awaits_links(&self) -> bool {
        matches!(self, Self::CollectingLinks)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CollectingLinks => "collecting_links",
            Self::CollectingLabel { .. } => "collecting_label",
            Self::CollectingQuality { .. } => "collecting_quality",
            Self::CollectingDestination { .. } => "collecting_destination",
            Self::Authorizing { .. } => "authorizing",
            Self::Processing => "processing",
            Self::Done => "done",
        }
    }

    pub fn step(self, event: SessionEvent, params: &SessionParams) -> (Self, Effect) {
        match (self, event) {
            (Self::Done, _) => abort(Error::message("session already finished")),
            (_, SessionEvent::Failed(err)) => abort(err),

            (Self::CollectingLinks, SessionEvent::LinksCollected(input)) => (
                Self::CollectingLabel { input },
                Effect::Prompt(Prompt::Label),
            ),

            (Self::CollectingLabel { input }, SessionEvent::Reply(reply)) => {
                let label = resolve_label(&reply, &input, &params.default_label);
                (
                    Self::CollectingQuality {
                        references: input.references,
                        label,
                    },
                    Effect::Prompt(Prompt::Quality),
                )
            },

            (Self::CollectingQuality { references, label }, SessionEvent::Reply(reply)) => {
                let quality = reply.trim();
                if quality.is_empty() {
                    return abort(Error::InvalidReply {
                        field: "resolution",
                        reason: "empty reply".into(),
                    });
                }
                (
                    Self::CollectingDestination {
                        references,
                        label,
                        quality: quality.to_string(),
                    },
                    Effect::Prompt(Prompt::Destination),
                )
            },

            (
                Self::CollectingDestination {
                    references,
                    label,
                    quality,
                },
                SessionEvent::Reply(reply),
            ) => match resolve_destination(&reply, params.chat_id) {
                Ok(destination) => (
                    Self::Authorizing {
                        job: BatchJob {
                            references,
                            label,
                            quality,
                            destination,
                        },
                    },
                    Effect::CheckDestination(destination),
                ),
                Err(err) => abort(err),
            },

            (Self::Authorizing { job }, SessionEvent::DestinationChecked(Ok(()))) => {
                (Self::Processing, Effect::RunBatch(job))
            },
            (Self::Authorizing { .. }, SessionEvent::DestinationChecked(Err(err))) => abort(err),

            (Self::Processing, SessionEvent::BatchFinished(report)) => (
                Self::Done,
                Effect::Finish(SessionOutcome::Completed(report)),
            ),

            (state, event) => abort(Error::message(format!(
                "unexpected {} in state {}",
                event_name(&event),
                state.name()
            ))),
        }
    }
}

fn abort(err: Error) -> (SessionState, Effect) {
    (
        SessionState::Done,
        Effect::Finish(SessionOutcome::Aborted(err)),
    )
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::LinksCollected(_) => "links",
        SessionEvent::Reply(_) => "reply",
        SessionEvent::DestinationChecked(_) => "destination check",
        SessionEvent::BatchFinished(_) => "batch report",
        SessionEvent::Failed(_) => "failure",
    }
}

/// `/d` picks the uploaded file's stem, else `default_label`; so does a blank reply.
fn resolve_label(reply: &str, input: &CollectedInput, default_label: &str) -> String {
    let reply = reply.trim();
    if reply.is_empty() || reply == DEFAULT_TOKEN {
        input.upload_stem().unwrap_or(default_label).to_string()
    } else {
        reply.to_string()
    }
}

fn resolve_destination(reply: &str, chat_id: i64) -> Result<i64, Error> {
    let reply = reply.trim();
    if reply == DEFAULT_TOKEN {
        return Ok(chat_id);
    }
    reply
        .parse::<i64>()
        .map_err(|_| Error::destination_invalid(reply, "not a numeric chat id"))
}
