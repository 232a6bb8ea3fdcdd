//! Hub state.
//!
//! [`Hub`] owns everything: sessions, nick index, ban lists, accounts, the
//! broadcast cache and the timers. The other modules are the pieces it is
//! built from.

mod accounts;
mod cachelist;
mod clock;
mod hub;
mod rights;
mod stats;
mod uid;
mod user;

pub use accounts::{Account, AccountError, Accounts, AccountsFile, Group, PasswordCheck};
pub use cachelist::{CacheList, DepartedUser};
pub use clock::Clock;
pub use hub::{Hub, SOFTWARE, Session};
pub use rights::{Rights, UnknownRight};
pub use stats::{HubStats, Refusal};
pub use uid::{ConnId, ConnIdGenerator, HUBSEC_ID};
pub use user::{ProtocolState, User};

#[cfg(test)]
pub(crate) use hub::test_support;
