use serde::Serialize;

use crate::{batch::Reference, error::Error};

/// How one item of a batch resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Uploaded; `waited_secs` is set when a rate limit was honored first.
    Published { waited_secs: Option<u64> },
    FetchFailed { reason: String },
    PublishFailed { reason: String },
    /// The destination kept rate limiting; the wait was honored, the item skipped.
    RateLimited { waited_secs: u64 },
    /// Unexpected failure contained to this item.
    Failed { reason: String },
    Cancelled,
}

impl ItemStatus {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    /// 1-based position in the batch.
    pub index: usize,
    pub reference: Reference,
    pub status: ItemStatus,
}

/// Per-item outcomes of one batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    items: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: ItemOutcome) {
        self.items.push(outcome);
    }

    pub fn items(&self) -> &[ItemOutcome] {
        &self.items
    }

    pub fn published(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_published()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Cancelled))
            .count()
    }

    /// Items that were attempted and not published.
    pub fn failed(&self) -> usize {
        self.items.len() - self.published() - self.cancelled()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled() > 0
    }

    /// Closing HTML message sent to the caller.
    pub fn summary(&self) -> String {
        let total = self.items.len();
        let mut out = if self.was_cancelled() {
            format!(
                "<b>🛑 Batch cancelled.</b>\n{} of {total} published before stopping.",
                self.published()
            )
        } else {
            format!(
                "<b>✅ All downloads completed!</b>\n{} of {total} published.",
                self.published()
            )
        };
        let failed: Vec<String> = self
            .items
            .iter()
            .filter(|i| !i.status.is_published() && i.status != ItemStatus::Cancelled)
            .map(|i| i.index.to_string())
            .collect();
        if !failed.is_empty() {
            out.push_str(&format!("\nNot published: {}", failed.join(", ")));
        }
        out
    }
}

/// Terminal result of a conversation.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The batch ran; individual items may still have failed.
    Completed(BatchReport),
    /// The session ended before or instead of processing.
    Aborted(Error),
}

impl SessionOutcome {
    /// Final message for the caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::Completed(report) => report.summary(),
            Self::Aborted(err) => err.user_message(),
        }
    }
}
