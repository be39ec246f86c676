//! Observable side channels: dropped frames, announcements, traces, pongs,
//! system events, and CoAP responses (pre-correlation).
//!
//! The core never prints directly. Instead it calls into an injected
//! [`DeviceEventSink`], matching the "process-wide console logging" callback
//! this module replaces.

use std::path::Path;

use mup1_proto::ParsedCoap;

use crate::error::FrameDropReason;

/// Sink for events a [`crate::connection::ConnectionHandle`] cannot resolve
/// into a waiter: dropped frames and the announcement/trace/pong/system side
/// channels.
pub trait DeviceEventSink: Send + Sync {
    /// The stream reassembler or frame codec discarded a candidate frame.
    fn frame_dropped(&self, path: &Path, reason: FrameDropReason) {
        let _ = (path, reason);
    }

    /// An `'A'` (announcement) frame arrived.
    fn announcement(&self, path: &Path, text: &str) {
        let _ = (path, text);
    }

    /// A `'T'` (trace) frame arrived.
    fn trace(&self, path: &Path, text: &str) {
        let _ = (path, text);
    }

    /// A `'P'` (ping) frame arrived — a pong, since this core only ever
    /// emits Ping outbound.
    fn pong(&self, path: &Path) {
        let _ = path;
    }

    /// An `'S'` (system) frame arrived.
    fn system(&self, path: &Path, payload: &[u8]) {
        let _ = (path, payload);
    }

    /// A CoAP response was parsed, before request-tracker correlation.
    fn coap_response(&self, path: &Path, parsed: &ParsedCoap) {
        let _ = (path, parsed);
    }
}

/// Default sink: everything goes through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl DeviceEventSink for TracingEventSink {
    fn frame_dropped(&self, path: &Path, reason: FrameDropReason) {
        tracing::warn!(path = %path.display(), %reason, "dropped frame");
    }

    fn announcement(&self, path: &Path, text: &str) {
        tracing::info!(path = %path.display(), %text, "announcement");
    }

    fn trace(&self, path: &Path, text: &str) {
        tracing::debug!(path = %path.display(), %text, "trace");
    }

    fn pong(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "pong");
    }

    fn system(&self, path: &Path, payload: &[u8]) {
        tracing::debug!(path = %path.display(), len = payload.len(), "system event");
    }

    fn coap_response(&self, path: &Path, parsed: &ParsedCoap) {
        tracing::trace!(path = %path.display(), message_id = parsed.message_id, code = %parsed.code_name(), "coap response");
    }
}
