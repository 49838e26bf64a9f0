use std::time::Duration;

use thiserror::Error;

use crate::format::escape_html;

#[derive(Debug, Error)]
pub enum Error {
    /// The links message or file contained no usable line.
    #[error("no valid links found")]
    EmptyInput,

    #[error("caller {caller} is not on the allowlist")]
    NotAuthorized { caller: i64 },

    /// Destination missing, not a channel, or the bot cannot post there.
    #[error("destination {destination} is not usable: {reason}")]
    DestinationInvalid { destination: String, reason: String },

    /// A reply could not be used for the prompt it answered.
    #[error("invalid {field}: {reason}")]
    InvalidReply {
        field: &'static str,
        reason: String,
    },

    #[error("fetch failed: {reason}")]
    FetchFailed { reason: String },

    #[error("no reply within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Channel(#[from] batchcast_channels::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn fetch_failed(reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn destination_invalid(destination: impl ToString, reason: impl Into<String>) -> Self {
        Self::DestinationInvalid {
            destination: destination.to_string(),
            reason: reason.into(),
        }
    }

    /// Single HTML message shown to the caller when a session ends on this error.
    ///
    /// Destination failures never reveal which check failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "<b>No valid links found!</b>".into(),
            Self::NotAuthorized { caller } => format!(
                "<b>⚠️ Access required!</b>\n\nYou are not allowed to run batches.\nYour ID: <code>{caller}</code>"
            ),
            Self::DestinationInvalid { .. } => {
                "<b>❌ Bot must be an admin with posting rights in the destination channel!</b>"
                    .into()
            },
            Self::InvalidReply { field, reason } => {
                format!("<b>❌ Invalid {field}:</b> {}", escape_html(reason))
            },
            Self::Timeout(after) => format!(
                "<b>⌛ No reply within {} seconds, batch aborted.</b>",
                after.as_secs()
            ),
            Self::Cancelled => "<b>🛑 Batch cancelled.</b>".into(),
            other => format!("<b>❌ Error:</b> <code>{}</code>", escape_html(&other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_message_hides_reason() {
        let err = Error::destination_invalid(-100, "chat not found");
        let msg = err.user_message();
        assert!(msg.contains("admin"));
        assert!(!msg.contains("chat not found"));
    }

    #[test]
    fn not_authorized_shows_caller_id() {
        let msg = Error::NotAuthorized { caller: 4242 }.user_message();
        assert!(msg.contains("<code>4242</code>"));
    }

    #[test]
    fn unexpected_errors_are_escaped() {
        let msg = Error::message("bad <tag> & more").user_message();
        assert!(msg.contains("bad &lt;tag&gt; &amp; more"));
    }

    #[test]
    fn timeout_reports_seconds() {
        let msg = Error::Timeout(Duration::from_secs(300)).user_message();
        assert!(msg.contains("300 seconds"));
    }
}
