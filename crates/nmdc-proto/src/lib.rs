//! # nmdc-proto
//!
//! Wire layer of the NMDC (Neo-Modern Direct Connect) hub protocol, free of
//! any hub state.
//!
//! ## Features
//!
//! - Buffer chains with delimiter splitting for stream reassembly
//! - Lock generation and the lock-to-key transform (bit-exact)
//! - `$Supports` flag table and `/%DCN000%/` escaping
//! - Token identification through a two-byte hashed prefix table
//! - Borrowed, bounds-checked parsers for every client token grammar
//! - MyINFO parsing, tag parsing and sanitised reconstruction
//! - Hub-to-client token builders
//! - Optional Tokio codec for `|`-delimited streams
//!
//! ## Quick Start
//!
//! ```rust
//! use nmdc_proto::{identify, lock_to_key, verify_key, TokenKind};
//!
//! let lock = b"EXTENDEDPROTOCOLabcdef";
//! let key = lock_to_key(lock);
//! assert!(verify_key(lock, &key));
//!
//! assert_eq!(identify(b"$ValidateNick alice"), TokenKind::ValidateNick);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod buffer;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod encode;
pub mod error;
pub mod escape;
pub mod lock;
pub mod message;
pub mod myinfo;
pub mod supports;
pub mod token;

pub use self::buffer::{BufferChain, BufferExt};
#[cfg(feature = "tokio")]
pub use self::codec::NmdcCodec;
pub use self::error::{ProtocolError, TokenError};
pub use self::escape::{escape_dcn, unescape_dcn};
pub use self::lock::{generate_lock, lock_challenge, lock_to_key, verify_key};
pub use self::message::{
    ChatLine, ConnectToMe, GetInfo, McTo, OpForceMove, PrivateMessage, RevConnectToMe, Search,
    SearchResult, SearchSource,
};
pub use self::myinfo::{FieldLimits, Mode, MyInfo, Tag};
pub use self::supports::{Supports, HUB_SUPPORTS};
pub use self::token::{identify, TokenKind};

/// The protocol delimiter.
pub const DELIMITER: u8 = b'|';
