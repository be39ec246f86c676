//! Property-based tests for the CoAP option encoder.

use mup1_proto::coap::{build, PAYLOAD_MARKER};
use mup1_proto::CoapMethod;
use proptest::prelude::*;

const METHODS: [CoapMethod; 7] = [
    CoapMethod::Get,
    CoapMethod::Post,
    CoapMethod::Put,
    CoapMethod::Delete,
    CoapMethod::Fetch,
    CoapMethod::Patch,
    CoapMethod::Ipatch,
];

fn arb_method() -> impl Strategy<Value = CoapMethod> {
    prop::sample::select(METHODS.to_vec())
}

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,8}".prop_map(String::from)
}

proptest! {
    /// Property 5: option numbers are non-decreasing and deltas
    /// reconstruct the correct absolute option number.
    #[test]
    fn coap_option_order(
        method in arb_method(),
        segments in prop::collection::vec(arb_segment(), 0..4),
        query_items in prop::collection::vec(arb_segment(), 0..4),
        message_id in any::<u16>(),
    ) {
        let path = format!("/{}", segments.join("/"));
        let uri = if query_items.is_empty() {
            path
        } else {
            format!("{path}?{}", query_items.join("&"))
        };
        let built = build(method, &uri, None, message_id);

        let mut i = 4;
        let mut current = 0i64;
        while i < built.len() && built[i] != PAYLOAD_MARKER {
            let header = built[i];
            i += 1;
            let delta_nibble = header >> 4;
            let length_nibble = header & 0x0F;

            let delta = match delta_nibble {
                13 => { let v = built[i] as i64 + 13; i += 1; v },
                14 => { let v = i64::from(u16::from_be_bytes([built[i], built[i + 1]])) + 269; i += 2; v },
                other => i64::from(other),
            };
            let length = match length_nibble {
                13 => { let v = built[i] as usize + 13; i += 1; v },
                14 => { let v = usize::from(u16::from_be_bytes([built[i], built[i + 1]])) + 269; i += 2; v },
                other => other as usize,
            };

            let number = current + delta;
            prop_assert!(number >= current);
            current = number;
            i += length;
        }
    }
}
