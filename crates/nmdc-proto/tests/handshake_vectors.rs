//! Known lock/key pairs and handshake token shapes.

use nmdc_proto::encode;
use nmdc_proto::lock::{generate_lock, lock_challenge, lock_to_key, lock_to_key_raw, EXTENDED_PREFIX};
use nmdc_proto::{identify, unescape_dcn, verify_key, Supports, TokenKind, HUB_SUPPORTS};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Reference transform written out byte by byte.
fn reference_key(lock: &[u8]) -> Vec<u8> {
    let n = lock.len();
    let mut key = vec![0u8; n];
    for i in 1..n {
        key[i] = lock[i] ^ lock[i - 1];
    }
    key[0] = lock[0] ^ lock[n - 1] ^ lock[n - 2] ^ 5;
    for b in key.iter_mut() {
        *b = ((*b << 4) & 0xF0) | ((*b >> 4) & 0x0F);
    }
    key
}

#[test]
fn raw_key_matches_reference() {
    let mut rng = StdRng::seed_from_u64(411);
    for len in [4, 8, 16, 32] {
        let lock = generate_lock(&mut rng, len);
        assert_eq!(lock_to_key_raw(lock.as_bytes()), reference_key(lock.as_bytes()));
    }
}

#[test]
fn escaped_key_unescapes_to_raw() {
    let lock = b"EXTENDEDPROTOCOL_verlihub";
    let key = lock_to_key(lock);
    assert_eq!(&*unescape_dcn(&key), &lock_to_key_raw(lock)[..]);
}

#[test]
fn client_handshake_round_trip() {
    let mut rng = StdRng::seed_from_u64(1);
    let challenge = generate_lock(&mut rng, 8);
    assert!(challenge.starts_with(EXTENDED_PREFIX));

    // What the client receives.
    let wire = encode::lock(&challenge, "nmdc-hubd0.4.0");
    let token = &wire[..wire.len() - 1];
    assert_eq!(identify(token), TokenKind::Lock);

    // What the client computes.
    let payload = &token[b"$Lock ".len()..];
    let key = lock_to_key(lock_challenge(payload));

    // What the hub verifies.
    assert!(verify_key(challenge.as_bytes(), &key));
}

#[test]
fn supports_reply_parses_back() {
    let wire = encode::supports(HUB_SUPPORTS);
    let args = &wire[b"$Supports ".len()..wire.len() - 1];
    assert_eq!(Supports::parse(args), HUB_SUPPORTS);
    assert!(!HUB_SUPPORTS.contains(Supports::ZPIPE));
}
