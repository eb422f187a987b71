//! Command handler functions, organized by category:
//! - `basic`: start, help, ping and fallbacks
//! - `tasks`: mirror, leech, ytdl and link intake
//! - `control`: status, cancel, cancelall
//! - `admin`: auth, unauth, users, log, restart

mod admin;
mod basic;
mod control;
mod tasks;

pub use admin::*;
pub use basic::*;
pub use control::*;
pub use tasks::*;
