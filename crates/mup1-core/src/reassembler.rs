//! Stream Reassembler: turns an arbitrarily chunked inbound byte stream into
//! a sequence of complete, validated MUP1 frames.

use mup1_proto::{mup1, DecodedFrame, FrameError, ESC, EOF, MIN_FRAME_LEN, SOF};

use crate::error::FrameDropReason;

/// One outcome of feeding bytes to the reassembler.
#[derive(Debug, Clone, PartialEq)]
pub enum ReassemblyEvent {
    /// A frame decoded with a valid checksum.
    Frame(DecodedFrame),
    /// A candidate frame was discarded; the reassembler has already resynced
    /// past it.
    Dropped(FrameDropReason),
}

/// Stateful byte-stream-to-frame reassembler.
///
/// Owns an append-only scratch buffer. Never blocks: [`push`](Self::push)
/// returns immediately with whatever frames a chunk completed.
#[derive(Debug, Clone)]
pub struct StreamReassembler {
    scratch: Vec<u8>,
    max_bytes: usize,
}

impl StreamReassembler {
    /// Create a reassembler that resets its scratch buffer once it grows
    /// past `max_bytes` with no resolvable frame.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { scratch: Vec::new(), max_bytes }
    }

    /// Number of scratch bytes currently buffered. Exposed for tests and
    /// diagnostics.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.scratch.len()
    }

    /// Feed a chunk of inbound bytes, returning every frame (or drop) it
    /// completed. A chunk boundary never coincides with a frame boundary by
    /// assumption; frames may span any number of chunks.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ReassemblyEvent> {
        self.scratch.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            let Some(sof_idx) = self.scratch.iter().position(|&b| b == SOF) else {
                self.reset_if_over_cap();
                break;
            };
            if sof_idx > 0 {
                self.scratch.drain(..sof_idx);
            }

            if self.scratch.len() < MIN_FRAME_LEN {
                self.reset_if_over_cap();
                break;
            }

            let Some(eof_idx) = find_unescaped_eof(&self.scratch) else {
                self.reset_if_over_cap();
                break;
            };

            let mut checksum_start = eof_idx + 1;
            if self.scratch.get(checksum_start) == Some(&EOF) {
                checksum_start += 1;
            }
            let frame_end = checksum_start + 4;

            if self.scratch.len() < frame_end {
                self.reset_if_over_cap();
                break;
            }

            let candidate = self.scratch[..frame_end].to_vec();
            self.scratch.drain(..frame_end);

            events.push(match mup1::decode(&candidate) {
                Ok(frame) if frame.checksum_valid => ReassemblyEvent::Frame(frame),
                Ok(_) => ReassemblyEvent::Dropped(FrameDropReason::ChecksumMismatch),
                Err(FrameError::TooShort) => ReassemblyEvent::Dropped(FrameDropReason::TooShort),
                Err(FrameError::BadSof) => ReassemblyEvent::Dropped(FrameDropReason::BadSof),
            });
        }

        events
    }

    fn reset_if_over_cap(&mut self) {
        if self.scratch.len() > self.max_bytes {
            self.scratch.clear();
        }
    }
}

/// Find the first unescaped EOF at or after index 2 (past SOF + type),
/// walking the escaped payload the same way `mup1::decode` does rather than
/// a raw byte scan. A literal 0x3C in the payload is wire-encoded as
/// `ESC, 0x3C` and must not be mistaken for the terminating EOF. Returns
/// `None` both when no EOF has arrived yet and when the buffer ends mid
/// escape sequence — either way the caller should wait for more bytes.
fn find_unescaped_eof(scratch: &[u8]) -> Option<usize> {
    let mut i = 2;
    while i < scratch.len() {
        match scratch[i] {
            ESC => {
                if i + 1 >= scratch.len() {
                    return None;
                }
                i += 2;
            },
            EOF => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use mup1_proto::MupType;
    use proptest::prelude::*;

    use super::*;

    /// Property 10: reassembly under arbitrary chunking.
    #[test]
    fn reassembly_byte_by_byte_matches_whole() {
        let encoded = mup1::encode(MupType::Coap, b"hello coreconf");

        let mut whole = StreamReassembler::new(4096);
        let whole_events = whole.push(&encoded);

        let mut piecewise = StreamReassembler::new(4096);
        let mut piecewise_events = Vec::new();
        for byte in &encoded {
            piecewise_events.extend(piecewise.push(std::slice::from_ref(byte)));
        }

        assert_eq!(whole_events, piecewise_events);
        assert_eq!(whole_events, vec![ReassemblyEvent::Frame(mup1::decode(&encoded).unwrap())]);
    }

    /// S6: splitting a 64-byte frame into chunks (1, 7, 20, remaining)
    /// yields exactly one dispatched frame with the same bytes.
    #[test]
    fn s6_chunked_coap_frame() {
        let payload = vec![0u8; 50];
        let encoded = mup1::encode(MupType::Coap, &payload);
        assert!(encoded.len() >= 28);

        let mut reassembler = StreamReassembler::new(4096);
        let splits = [1usize, 7, 20];
        let mut offset = 0;
        let mut events = Vec::new();
        for len in splits {
            events.extend(reassembler.push(&encoded[offset..offset + len]));
            offset += len;
        }
        events.extend(reassembler.push(&encoded[offset..]));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ReassemblyEvent::Frame(mup1::decode(&encoded).unwrap()));
    }

    #[test]
    fn escaped_eof_byte_in_payload_does_not_truncate_the_frame() {
        let encoded = mup1::encode(MupType::Coap, &[EOF]);
        let mut reassembler = StreamReassembler::new(4096);
        let events = reassembler.push(&encoded);
        assert_eq!(events, vec![ReassemblyEvent::Frame(mup1::decode(&encoded).unwrap())]);
    }

    #[test]
    fn resyncs_past_garbage_prefix() {
        let encoded = mup1::encode(MupType::Ping, &[]);
        let mut garbage = vec![0x01, 0x02, 0x03];
        garbage.extend_from_slice(&encoded);

        let mut reassembler = StreamReassembler::new(4096);
        let events = reassembler.push(&garbage);
        assert_eq!(events, vec![ReassemblyEvent::Frame(mup1::decode(&encoded).unwrap())]);
    }

    #[test]
    fn drops_checksum_mismatch_and_resyncs() {
        let mut encoded = mup1::encode(MupType::Ping, &[]);
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;
        let good = mup1::encode(MupType::Ping, &[]);

        let mut combined = encoded.clone();
        combined.extend_from_slice(&good);

        let mut reassembler = StreamReassembler::new(4096);
        let events = reassembler.push(&combined);
        assert_eq!(
            events,
            vec![
                ReassemblyEvent::Dropped(FrameDropReason::ChecksumMismatch),
                ReassemblyEvent::Frame(mup1::decode(&good).unwrap()),
            ]
        );
    }

    #[test]
    fn resets_unbounded_buffer_with_no_sof() {
        let mut reassembler = StreamReassembler::new(16);
        let events = reassembler.push(&[0u8; 32]);
        assert!(events.is_empty());
        assert_eq!(reassembler.buffered_len(), 0);
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_bytes(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let mut reassembler = StreamReassembler::new(4096);
            for chunk in chunks {
                let _ = reassembler.push(&chunk);
            }
        }
    }
}
