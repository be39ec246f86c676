//! MUP1 frame codec.
//!
//! MUP1 (Microchip UART Protocol #1) frames a byte stream with a one-byte
//! start-of-frame marker, a one-byte type, an escaped payload, one or two
//! end-of-frame markers, and a 4-hex-character one's-complement checksum.
//! This module is pure: no I/O, no async, just `encode`/`decode`.

use thiserror::Error;

/// Start-of-frame byte.
pub const SOF: u8 = 0x3E;
/// End-of-frame byte.
pub const EOF: u8 = 0x3C;
/// Escape byte.
pub const ESC: u8 = 0x5C;

/// Minimum valid frame length: SOF + type + EOF + 4 hex checksum chars.
pub const MIN_FRAME_LEN: usize = 8;

/// MUP1 frame type byte.
///
/// Outbound, this core only ever emits [`MupType::Coap`] and [`MupType::Ping`]
/// (see spec §6); the rest are inbound-only side channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MupType {
    /// Announcement ('A') — device identity broadcast.
    Announce,
    /// CoAP ('C') — request/response payload.
    Coap,
    /// Ping ('P') — link keepalive.
    Ping,
    /// Trace ('T') — diagnostic text.
    Trace,
    /// System ('S') — system event.
    System,
}

impl MupType {
    /// Wire byte for this type.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Announce => b'A',
            Self::Coap => b'C',
            Self::Ping => b'P',
            Self::Trace => b'T',
            Self::System => b'S',
        }
    }

    /// Decode a wire byte into a known type. `None` if unrecognized.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Self::Announce),
            b'C' => Some(Self::Coap),
            b'P' => Some(Self::Ping),
            b'T' => Some(Self::Trace),
            b'S' => Some(Self::System),
            _ => None,
        }
    }
}

/// Frame-layer errors.
///
/// Both are recoverable: the stream reassembler drops the offending frame
/// and resyncs on the next SOF rather than treating either as fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the minimum possible frame, or truncated mid-frame.
    #[error("frame too short")]
    TooShort,
    /// First byte was not the start-of-frame marker.
    #[error("missing start-of-frame marker")]
    BadSof,
}

/// A decoded MUP1 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Raw type byte (not required to be one of the five known commands).
    pub kind: u8,
    /// Unescaped payload bytes.
    pub payload: Vec<u8>,
    /// Whether the trailing checksum matched the computed value.
    ///
    /// A mismatch does not make decoding fail: the caller (the stream
    /// reassembler) decides whether to tolerate or discard the frame.
    pub checksum_valid: bool,
}

impl DecodedFrame {
    /// The type byte as a known [`MupType`], if recognized.
    #[must_use]
    pub const fn mup_type(&self) -> Option<MupType> {
        MupType::from_byte(self.kind)
    }
}

/// Encode a MUP1 frame.
///
/// Never fails: any payload, including an empty one, produces a valid frame.
#[must_use]
pub fn encode(kind: MupType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() * 2 + MIN_FRAME_LEN);
    buf.push(SOF);
    buf.push(kind.as_byte());

    for &byte in payload {
        match byte {
            0x00 => {
                buf.push(ESC);
                buf.push(b'0');
            },
            0xFF => {
                buf.push(ESC);
                buf.push(b'F');
            },
            SOF | EOF | ESC => {
                buf.push(ESC);
                buf.push(byte);
            },
            other => buf.push(other),
        }
    }

    // Pad to a second EOF when the header+payload length (i.e. the length
    // before this first EOF) is even, keeping the pre-checksum frame length
    // consistent regardless of payload parity.
    let pad = buf.len() % 2 == 0;
    buf.push(EOF);
    if pad {
        buf.push(EOF);
    }

    let sum = checksum16(&buf);
    buf.extend_from_slice(format!("{sum:04X}").as_bytes());
    buf
}

/// Decode a MUP1 frame.
///
/// # Errors
///
/// - [`FrameError::TooShort`] if `bytes` is shorter than the minimum frame,
///   or truncated before a terminating EOF / checksum is found.
/// - [`FrameError::BadSof`] if `bytes[0]` is not the start-of-frame marker.
pub fn decode(bytes: &[u8]) -> Result<DecodedFrame, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort);
    }
    if bytes[0] != SOF {
        return Err(FrameError::BadSof);
    }

    let kind = bytes[1];
    let mut payload = Vec::new();
    let mut i = 2;

    let first_eof = loop {
        let byte = *bytes.get(i).ok_or(FrameError::TooShort)?;
        if byte == ESC {
            let next = *bytes.get(i + 1).ok_or(FrameError::TooShort)?;
            payload.push(unescape_byte(next));
            i += 2;
        } else if byte == EOF {
            break i;
        } else {
            payload.push(byte);
            i += 1;
        }
    };

    let mut checksum_input_end = first_eof + 1;
    let mut checksum_start = first_eof + 1;
    if bytes.get(checksum_start) == Some(&EOF) {
        checksum_input_end += 1;
        checksum_start += 1;
    }

    let hex = bytes.get(checksum_start..checksum_start + 4).ok_or(FrameError::TooShort)?;
    let expected = std::str::from_utf8(hex).ok().and_then(|s| u16::from_str_radix(s, 16).ok());
    let computed = checksum16(&bytes[..checksum_input_end]);

    Ok(DecodedFrame { kind, payload, checksum_valid: expected == Some(computed) })
}

/// Map an escaped byte (the byte following [`ESC`]) back to its raw value.
///
/// Unknown escape sequences pass the raw byte through unchanged.
const fn unescape_byte(escaped: u8) -> u8 {
    match escaped {
        b'0' => 0x00,
        b'F' => 0xFF,
        SOF | EOF | ESC => escaped,
        other => other,
    }
}

/// 16-bit one's-complement checksum, stored form (post bitwise-NOT).
///
/// Sums big-endian 16-bit words; an odd byte count treats the final byte as
/// the high byte of a word with a zero low byte. Carries above bit 15 are
/// folded back in by addition.
fn checksum16(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    #[allow(clippy::cast_possible_truncation)]
    let folded = sum as u16;
    !folded
}

// Property-based round-trip tests (properties 1, 2, 3, 4) live in
// tests/frame_properties.rs, alongside the CoAP codec's property test, in
// the teacher's crate-level integration-test style rather than inline.
