//! Operator command surface.
//!
//! Commands are typed in main chat as `!name args` or sent as a private
//! message to the hub security bot. The answer goes back to the invoker
//! alone, through the same channel the command came in on.

mod commands;
mod ops;

pub use commands::{COMMANDS, Command};
pub use ops::{BanScope, ban_notice};

use thiserror::Error;
use tracing::debug;

use crate::config::StoreError;
use crate::persistence::PersistenceError;
use crate::security::BanError;
use crate::state::{AccountError, ConnId, Hub, UnknownRight};

/// Errors from operator commands and actions. The text is what the
/// invoker reads.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command !{0}, try !help.")]
    UnknownCommand(String),

    #[error("You are not allowed to use !{0}.")]
    Unauthorized(&'static str),

    #[error("{0} is not online.")]
    NotOnline(String),

    #[error("{0} cannot be touched.")]
    Protected(String),

    #[error("Not a duration: {0}")]
    BadDuration(String),

    #[error("Not an address or network: {0}")]
    BadAddress(String),

    #[error("Nothing matched {0}.")]
    NotFound(String),

    #[error("Refused by a plugin.")]
    Vetoed,

    #[error(transparent)]
    Ban(#[from] BanError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Config(#[from] StoreError),

    #[error(transparent)]
    Rights(#[from] UnknownRight),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// How the invoker reaches the hub security bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyVia {
    /// `!command` in main chat; answered in main chat.
    Chat,
    /// PM to the bot; answered by PM.
    Private,
}

/// Whether the first word of `line` (without its `!`) names a command.
pub fn is_command(line: &str) -> bool {
    let (name, _) = commands::split_word(line);
    COMMANDS.iter().any(|c| c.name.eq_ignore_ascii_case(name))
}

/// Run one command line (without its `!`) for `id` and answer it.
pub fn execute(hub: &mut Hub, id: ConnId, line: &str, via: ReplyVia) {
    let (name, args) = commands::split_word(line);
    let name = name.to_ascii_lowercase();
    debug!(%id, command = %name, "Admin command");

    let reply = match commands::run(hub, id, &name, args) {
        Ok(text) => text,
        Err(e) => e.to_string(),
    };
    if reply.is_empty() {
        return;
    }
    match via {
        ReplyVia::Chat => hub.hub_message(id, &reply),
        ReplyVia::Private => hub.hub_pm(id, &reply),
    };
}
