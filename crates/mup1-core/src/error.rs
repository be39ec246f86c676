//! Error types for device connections and the device registry.
//!
//! Frame- and reassembler-layer errors ([`FrameDropReason`]) are logged and
//! absorbed by the stream reassembler; they never reach a caller. Every
//! other error surfaces to the waiter (or caller) that triggered it.

use std::{path::PathBuf, time::Duration};

use mup1_proto::{CoapPayload, UnknownMethod};
use thiserror::Error;

/// Why the stream reassembler discarded a candidate frame.
///
/// Non-fatal: the reassembler resyncs on the next start-of-frame byte.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameDropReason {
    /// Candidate frame shorter than the minimum possible frame.
    #[error("frame too short")]
    TooShort,
    /// First byte was not the start-of-frame marker.
    #[error("missing start-of-frame marker")]
    BadSof,
    /// Checksum did not match the computed value.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Errors surfaced from a single `request()` call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Method code has no known [`mup1_proto::CoapMethod`] mapping.
    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethod),

    /// `request()` was called while the connection was not Open.
    #[error("device is not connected")]
    NotConnected,

    /// No response arrived within the configured timeout.
    #[error("request timed out after {elapsed:?}: {method} {uri}")]
    Timeout {
        /// Method of the timed-out request.
        method: String,
        /// URI of the timed-out request.
        uri: String,
        /// Time elapsed before the timeout fired.
        elapsed: Duration,
    },

    /// The device responded with a non-2.xx code.
    #[error("device returned {code_name}")]
    Coap {
        /// Raw numeric CoAP response code.
        code: u8,
        /// `"C.DD"` formatted code, e.g. `"4.04"`.
        code_name: String,
        /// Response payload, if any.
        payload: CoapPayload,
    },

    /// The serial link closed or errored while this request was pending.
    #[error("device disconnected")]
    Disconnected,

    /// The request was withdrawn before a response arrived (e.g. the
    /// outbound write failed after the message ID was already allocated).
    #[error("request cancelled")]
    Cancelled,
}

/// Errors surfaced from [`crate::registry::DeviceRegistry`] operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No connection is registered for this path.
    #[error("device not found: {}", .0.display())]
    DeviceNotFound(PathBuf),

    /// Underlying request failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Serial port or device-directory I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
