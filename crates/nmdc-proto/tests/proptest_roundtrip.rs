//! Property-based tests for stream reassembly and token parsing.
//!
//! Uses proptest to verify that:
//! 1. Splitting a byte stream on `|` and restoring the delimiters gives back
//!    the original stream, however the stream was chunked on arrival
//! 2. Parsers never panic on arbitrary input
//! 3. The lock/key transform always yields escaped, delimiter-free keys

use proptest::prelude::*;
use nmdc_proto::message::{ChatLine, ConnectToMe, OpForceMove, PrivateMessage, Search, SearchResult};
use nmdc_proto::{identify, lock_to_key, BufferChain, MyInfo, Tag};

// =============================================================================
// STRATEGIES
// =============================================================================

/// A byte stream biased towards delimiters.
fn stream_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            3 => Just(b'|'),
            10 => any::<u8>(),
        ],
        0..512,
    )
}

/// Cut points inside a stream of length `len`.
fn chunked(stream: Vec<u8>) -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    let len = stream.len();
    (
        Just(stream),
        prop::collection::vec(0..=len, 0..16).prop_map(|mut cuts| {
            cuts.sort_unstable();
            cuts
        }),
    )
}

fn chunks<'a>(stream: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        out.push(&stream[start..cut]);
        start = cut;
    }
    out.push(&stream[start..]);
    out
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn split_restores_stream((stream, cuts) in stream_strategy().prop_flat_map(chunked)) {
        let mut chain = BufferChain::new();
        let mut rebuilt = Vec::with_capacity(stream.len());
        for chunk in chunks(&stream, &cuts) {
            chain.push_slice(chunk);
            while let Some(token) = chain.split_on_delimiter(b"|") {
                prop_assert!(!token.contains(&b'|'));
                rebuilt.extend_from_slice(&token);
                rebuilt.push(b'|');
            }
        }
        rebuilt.extend_from_slice(&chain.concat_copy(0));
        prop_assert_eq!(rebuilt, stream);
    }

    #[test]
    fn split_multibyte_restores_stream(
        parts in prop::collection::vec("[a-z]{0,8}", 1..20),
        cut in 0usize..64,
    ) {
        let stream = parts.join("\r\n").into_bytes();
        let cut = cut.min(stream.len());
        let mut chain = BufferChain::new();
        chain.push_slice(&stream[..cut]);
        chain.push_slice(&stream[cut..]);
        let mut tokens = Vec::new();
        while let Some(token) = chain.split_on_delimiter(b"\r\n") {
            tokens.push(String::from_utf8(token.to_vec()).unwrap());
        }
        tokens.push(String::from_utf8(chain.concat_copy(0).to_vec()).unwrap());
        prop_assert_eq!(tokens, parts);
    }

    #[test]
    fn parsers_never_panic(token in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = identify(&token);
        let _ = ChatLine::parse(&token);
        let _ = Search::parse(&token);
        let _ = SearchResult::parse(&token);
        let _ = ConnectToMe::parse(&token);
        let _ = PrivateMessage::parse(&token);
        let _ = OpForceMove::parse(&token);
        let _ = Tag::parse(&token);
        if let Ok(info) = MyInfo::parse(&token) {
            let _ = info.share_size();
            let _ = info.parsed_tag();
        }
    }

    #[test]
    fn prefixed_garbage_never_panics(
        prefix in prop_oneof![
            Just("$MyINFO $ALL "),
            Just("$Search "),
            Just("$SR "),
            Just("$To: "),
            Just("$ConnectToMe "),
            Just("$OpForceMove $Who:"),
        ],
        tail in "[ -~\\x05]{0,64}",
    ) {
        let token = format!("{prefix}{tail}");
        let _ = identify(token.as_bytes());
        let _ = MyInfo::parse(token.as_bytes());
        let _ = Search::parse(token.as_bytes());
        let _ = SearchResult::parse(token.as_bytes());
        let _ = PrivateMessage::parse(token.as_bytes());
        let _ = ConnectToMe::parse(token.as_bytes());
        let _ = OpForceMove::parse(token.as_bytes());
    }

    #[test]
    fn keys_are_frame_safe(lock in prop::collection::vec(any::<u8>(), 3..64)) {
        let key = lock_to_key(&lock);
        prop_assert!(!key.contains(&b'|'));
        prop_assert!(!key.contains(&b'$'));
        prop_assert!(!key.contains(&0));
        prop_assert!(key.len() >= lock.len());
    }
}
