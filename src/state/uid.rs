//! Connection identifiers.

use std::fmt;

/// Identifier of one accepted connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Hands out increasing connection ids.
///
/// Id 0 is reserved for the hub security bot.
#[derive(Debug)]
pub struct ConnIdGenerator {
    counter: u64,
}

/// The hub security bot's id.
pub const HUBSEC_ID: ConnId = ConnId(0);

impl Default for ConnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnIdGenerator {
    pub fn new() -> Self {
        Self { counter: 1 }
    }

    /// Generate the next id.
    pub fn next_id(&mut self) -> ConnId {
        let id = ConnId(self.counter);
        self.counter += 1;
        id
    }
}
