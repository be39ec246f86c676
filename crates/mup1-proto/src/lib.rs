//! MUP1 framing and CoAP/CORECONF wire codecs.
//!
//! This crate is the pure, no-I/O layer: byte-in/byte-out encoders and
//! decoders for the two wire formats [`mup1`] and [`coap`] that VelocityDRIVE
//! devices speak over a serial link. Nothing here touches a clock, a socket,
//! or a filesystem — that belongs to `mup1-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coap;
pub mod mup1;
pub mod value;

pub use coap::{CoapError, CoapMessageType, CoapMethod, CoapPayload, ParsedCoap, UnknownMethod};
pub use mup1::{DecodedFrame, FrameError, MupType, ESC, EOF, MIN_FRAME_LEN, SOF};
pub use value::CborValue;
