//! Lock/key challenge-response.
//!
//! The hub opens every connection with `$Lock <challenge> Pk=<id>|`; the
//! client answers `$Key <key>|` where the key is a deterministic transform
//! of the challenge bytes. It authenticates client implementations, not
//! users, and offers no cryptographic strength.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::escape::escape_dcn;

/// Prefix of every lock that advertises extended protocol support.
pub const EXTENDED_PREFIX: &str = "EXTENDEDPROTOCOL";

/// Generate a lock challenge: the extended-protocol prefix followed by
/// `random_len` random alphanumeric characters.
pub fn generate_lock<R: Rng + ?Sized>(rng: &mut R, random_len: usize) -> String {
    let mut lock = String::with_capacity(EXTENDED_PREFIX.len() + random_len);
    lock.push_str(EXTENDED_PREFIX);
    lock.extend(
        rng.sample_iter(Alphanumeric)
            .take(random_len)
            .map(char::from),
    );
    lock
}

/// Strip the ` Pk=...` suffix from a `$Lock` payload, leaving the challenge.
pub fn lock_challenge(payload: &[u8]) -> &[u8] {
    const PK: &[u8] = b" Pk=";
    payload
        .windows(PK.len())
        .position(|w| w == PK)
        .map_or(payload, |pos| &payload[..pos])
}

/// Compute the raw (unescaped) key for a lock challenge.
///
/// Locks shorter than three bytes have no defined key; an empty vector is
/// returned.
pub fn lock_to_key_raw(lock: &[u8]) -> Vec<u8> {
    let n = lock.len();
    if n < 3 {
        return Vec::new();
    }
    let mut key = Vec::with_capacity(n);
    key.push(lock[0] ^ lock[n - 1] ^ lock[n - 2] ^ 5);
    for i in 1..n {
        key.push(lock[i] ^ lock[i - 1]);
    }
    for byte in &mut key {
        *byte = byte.rotate_left(4);
    }
    key
}

/// Compute the escaped key a client must send for `lock`.
pub fn lock_to_key(lock: &[u8]) -> Vec<u8> {
    escape_dcn(&lock_to_key_raw(lock)).into_owned()
}

/// Check a received key against the challenge that was sent.
pub fn verify_key(lock: &[u8], key: &[u8]) -> bool {
    let expected = lock_to_key(lock);
    !expected.is_empty() && expected == key
}
