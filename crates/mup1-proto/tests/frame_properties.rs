//! Property-based tests for the MUP1 frame codec.
//!
//! These exercise `encode`/`decode` round-trip behavior across arbitrary
//! inputs rather than fixed examples, as a crate-level integration test.

use mup1_proto::mup1::{decode, encode};
use mup1_proto::{MupType, EOF, ESC, SOF};
use proptest::prelude::*;

const COMMANDS: [MupType; 5] =
    [MupType::Announce, MupType::Coap, MupType::Ping, MupType::Trace, MupType::System];

fn arb_mup_type() -> impl Strategy<Value = MupType> {
    prop::sample::select(COMMANDS.to_vec())
}

fn escaped_len(payload: &[u8]) -> usize {
    payload.iter().map(|&b| if matches!(b, 0x00 | 0xFF | SOF | EOF | ESC) { 2 } else { 1 }).sum()
}

proptest! {
    /// Property 1: frame round-trip.
    #[test]
    fn frame_round_trip(kind in arb_mup_type(), payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let encoded = encode(kind, &payload);
        let decoded = decode(&encoded).expect("should decode");
        prop_assert_eq!(decoded.kind, kind.as_byte());
        prop_assert_eq!(decoded.payload, payload);
        prop_assert!(decoded.checksum_valid);
    }

    /// Property 2: escape correctness — no unescaped 0x00/0xFF, and the
    /// only unescaped 0x3C bytes are the EOF marker(s).
    #[test]
    fn escape_correctness(kind in arb_mup_type(), payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let encoded = encode(kind, &payload);
        let body = &encoded[2..encoded.len() - 4];

        let mut i = 0;
        let mut eof_positions = Vec::new();
        while i < body.len() {
            if body[i] == ESC {
                i += 2;
                continue;
            }
            prop_assert_ne!(body[i], 0x00);
            prop_assert_ne!(body[i], 0xFF);
            if body[i] == EOF {
                eof_positions.push(i);
            }
            i += 1;
        }
        prop_assert!(eof_positions.len() == 1 || eof_positions.len() == 2);
        // EOF marker(s) must be a contiguous suffix of body.
        for (offset, pos) in eof_positions.iter().rev().enumerate() {
            prop_assert_eq!(*pos, body.len() - 1 - offset);
        }
    }

    /// Property 3: checksum property — mutating any pre-checksum byte
    /// invalidates the checksum.
    #[test]
    fn checksum_detects_mutation(
        kind in arb_mup_type(),
        payload in prop::collection::vec(any::<u8>(), 1..64),
        mutate_idx in 0usize..64,
    ) {
        let mut encoded = encode(kind, &payload);
        let pre_checksum_len = encoded.len() - 4;
        let idx = mutate_idx % pre_checksum_len;
        encoded[idx] ^= 0xFF;

        let decoded = decode(&encoded).expect("should still parse structurally");
        prop_assert!(!decoded.checksum_valid);
    }

    /// Property 4: padding rule.
    #[test]
    fn padding_rule(kind in arb_mup_type(), payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let encoded = encode(kind, &payload);
        let pre_eof_len = 2 + escaped_len(&payload);
        let body_after_header = &encoded[2 + escaped_len(&payload)..];
        let eof_count = body_after_header.iter().take_while(|&&b| b == EOF).count();
        if pre_eof_len % 2 == 0 {
            prop_assert_eq!(eof_count, 2);
        } else {
            prop_assert_eq!(eof_count, 1);
        }
    }
}
