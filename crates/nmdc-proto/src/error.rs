//! Error types for the NMDC protocol library.
//!
//! [`ProtocolError`] covers stream-level failures (I/O, oversized tokens);
//! [`TokenError`] covers a single token that does not match its grammar.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Stream-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A token grew past the configured maximum without a delimiter.
    #[error("token too long: {actual} bytes (limit: {limit})")]
    TokenTooLong {
        /// Bytes buffered so far.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A token could not be parsed.
    #[error("invalid token: {0}")]
    Token(#[from] TokenError),
}

/// Errors produced while parsing a single `|`-delimited token.
///
/// Parsers never panic on attacker-controlled input; every malformed shape
/// maps to one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The token does not start with the expected prefix.
    #[error("expected {expected} token")]
    WrongKind {
        /// The token name the parser expected.
        expected: &'static str,
    },

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but empty.
    #[error("empty field `{0}`")]
    EmptyField(&'static str),

    /// A field has an invalid shape (bad number, bad address, stray delimiter).
    #[error("malformed field `{0}`")]
    Malformed(&'static str),

    /// A field that must be text is not valid UTF-8.
    #[error("field `{0}` is not valid UTF-8")]
    NotUtf8(&'static str),
}
