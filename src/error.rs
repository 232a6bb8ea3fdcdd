//! Error handling for the protocol state machine.
//!
//! Every token handler returns a [`HandlerResult`]. Errors never travel
//! further than the dispatcher, which maps each one to an [`ErrorAction`]
//! and labels the metric with [`HandlerError::error_code`].

use nmdc_proto::TokenError;
use thiserror::Error;

use crate::security::RateAction;

/// What the dispatcher does with a failed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Count it and move on.
    Ignore,
    /// Tell the user, then move on.
    Warn,
    Disconnect,
    /// Hard-ban the source IP and disconnect.
    Ban,
}

/// Errors that can occur during token handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed token: {0}")]
    Malformed(#[from] TokenError),

    /// A known token in a state that does not accept it.
    #[error("unexpected {0} token")]
    OutOfOrder(&'static str),

    #[error("You are not allowed to {0}.")]
    Unauthorized(&'static str),

    /// Denied by a bucket; warns and counts towards a violation ban.
    #[error("You are sending {0} too fast, slow down.")]
    RateLimited(RateAction),

    /// Denied by a bucket; dropped without a word.
    #[error("{0} throttled")]
    Throttled(RateAction),

    #[error("Your {0} is too long.")]
    TooLong(&'static str),

    /// The nick or IP inside the token is not the sender's.
    #[error("faked {0}")]
    Spoofed(&'static str),

    #[error("broken key")]
    BrokenKey,

    /// `$MyNick` on the hub port before the handshake.
    #[error("$MyNick before handshake")]
    CtmExploit,

    #[error("nick rejected: {0}")]
    NickRejected(String),

    #[error("bad password")]
    BadPassword,

    #[error("vetoed by plugin")]
    Vetoed,

    #[error("{0} is not online")]
    UnknownTarget(String),

    /// The connection was closed while the token was in flight.
    #[error("connection closed")]
    Gone,

    /// Login refused by policy (ban, full hub, tag rules). The user has
    /// already been told.
    #[error("{0}")]
    Refused(String),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::OutOfOrder(_) => "out_of_order",
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited(_) => "rate_limited",
            Self::Throttled(_) => "throttled",
            Self::TooLong(_) => "too_long",
            Self::Spoofed(_) => "spoofed",
            Self::BrokenKey => "broken_key",
            Self::CtmExploit => "ctm_exploit",
            Self::NickRejected(_) => "nick_rejected",
            Self::BadPassword => "bad_password",
            Self::Vetoed => "vetoed",
            Self::UnknownTarget(_) => "unknown_target",
            Self::Gone => "gone",
            Self::Refused(_) => "refused",
        }
    }

    pub fn action(&self) -> ErrorAction {
        match self {
            Self::Malformed(_)
            | Self::OutOfOrder(_)
            | Self::Throttled(_)
            | Self::Vetoed
            | Self::Gone
            | Self::UnknownTarget(_) => ErrorAction::Ignore,
            Self::Unauthorized(_) | Self::RateLimited(_) | Self::TooLong(_) => ErrorAction::Warn,
            Self::Spoofed(_)
            | Self::BrokenKey
            | Self::NickRejected(_)
            | Self::BadPassword
            | Self::Refused(_) => ErrorAction::Disconnect,
            Self::CtmExploit => ErrorAction::Ban,
        }
    }
}

/// Result type for token handlers.
pub type HandlerResult = Result<(), HandlerError>;
