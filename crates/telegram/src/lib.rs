//! Telegram front end for the batch pipeline.
//!
//! Polls the Bot API for updates, routes `/start`, `/master` and `/cancel`,
//! and implements [`batchcast_channels::ChannelTransport`] with teloxide.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

pub use {
    bot::start_polling,
    error::{Error, Result},
    outbound::TelegramTransport,
    state::BotState,
};
