use std::time::Duration;

use {
    batchcast_common::types::InboundMessage, tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

use crate::error::{Error, Result};

/// Receiving end of the per-session message queue.
///
/// Each prompt waits at most `timeout` for a reply.
#[derive(Debug)]
pub struct SessionInbox {
    rx: mpsc::Receiver<InboundMessage>,
    timeout: Duration,
}

impl SessionInbox {
    pub fn channel(capacity: usize, timeout: Duration) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, timeout })
    }

    /// Next reply from the caller.
    ///
    /// A closed queue counts as cancellation: the dispatcher dropped the session.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<InboundMessage> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout(self.timeout, self.rx.recv()) => match res {
                Ok(Some(msg)) => Ok(msg),
                Ok(None) => Err(Error::Cancelled),
                Err(_) => Err(Error::Timeout(self.timeout)),
            },
        }
    }
}
