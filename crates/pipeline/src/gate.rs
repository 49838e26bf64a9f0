//! Authorization gate: caller allowlist and destination capability checks.

use {
    batchcast_channels::{Allowlist, ChannelTransport},
    batchcast_common::types::ChatType,
    tracing::{info, warn},
};

use crate::error::{Error, Result};

/// Reject callers that are not on the allowlist.
pub fn check_caller(allowlist: &Allowlist, caller: i64) -> Result<()> {
    if allowlist.permits(&caller.to_string()) {
        Ok(())
    } else {
        warn!(caller, "batch request from caller not on allowlist");
        Err(Error::NotAuthorized { caller })
    }
}

/// Accept `destination` only if it is a channel the bot can post in.
///
/// Lookup failures are folded into [`Error::DestinationInvalid`].
pub async fn check_destination(transport: &dyn ChannelTransport, destination: i64) -> Result<()> {
    let reason = match transport.resolve_endpoint(destination).await {
        Ok(info) if info.chat_type == ChatType::Channel && info.can_post => {
            info!(destination, "destination verified");
            return Ok(());
        },
        Ok(info) if info.chat_type != ChatType::Channel => {
            format!("chat is a {}, not a channel", info.chat_type)
        },
        Ok(_) => "bot has no posting rights".to_string(),
        Err(e) => e.to_string(),
    };
    warn!(destination, %reason, "destination rejected");
    Err(Error::destination_invalid(destination, reason))
}
