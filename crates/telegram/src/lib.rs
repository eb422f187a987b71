//! Telegram front end of the mirror/leech bot
//!
//! The dispatcher [`telegram::schema`], its command and callback handlers,
//! authorization, and the task pipeline that downloads through the engine
//! and uploads to Telegram or Google Drive.

pub mod auth;
pub mod callbacks;
pub mod commands;
pub mod constants;
pub mod context;
pub mod error;
pub mod handlers;
pub mod keyboards;
pub mod leech;
pub mod pipeline;
pub mod rate_limit;
pub mod restart;
pub mod status;
pub mod telegram;
pub mod types;
pub mod utils;

pub use context::BotContext;
pub use error::{BotError, BotResult};
pub use teloxide::prelude::Dispatcher;
pub use types::{Command, HandlerResult, MyDialogue, State};
