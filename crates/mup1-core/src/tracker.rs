//! Request Tracker: correlates asynchronous CoAP responses back to the
//! request that produced their message ID.
//!
//! Owned exclusively by one [`crate::connection`] actor task, so the pending
//! map never needs its own lock — single-writer by construction, matching
//! the "promise correlation map" design.

use std::{collections::HashMap, time::Instant};

use mup1_proto::{CoapMethod, CoapPayload, ParsedCoap};
use tokio::sync::oneshot;

use crate::error::RequestError;

/// Allocates message IDs: random seed, wraps `0xFFFF` back to `1` (0 is
/// skipped to avoid ambiguity with zeroed memory), and skips forward past
/// any ID still pending.
#[derive(Debug, Clone, Copy)]
pub struct MessageIdAllocator {
    next: u16,
}

impl MessageIdAllocator {
    /// Seed the allocator with a random starting ID.
    #[must_use]
    pub fn new() -> Self {
        Self::seeded(rand::random())
    }

    /// Seed the allocator explicitly (used by tests for determinism).
    #[must_use]
    pub const fn seeded(seed: u16) -> Self {
        Self { next: if seed == 0 { 1 } else { seed } }
    }

    fn advance(&mut self) {
        self.next = if self.next == 0xFFFF { 1 } else { self.next + 1 };
    }

    /// Allocate the next free ID, skipping any already present in `pending`.
    fn allocate<V>(&mut self, pending: &HashMap<u16, V>) -> u16 {
        loop {
            let candidate = self.next;
            self.advance();
            if !pending.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for MessageIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A request awaiting a response, a timeout, a cancellation, or a
/// disconnect — exactly one of those settles its waiter.
struct PendingEntry {
    method: CoapMethod,
    uri: String,
    created_at: Instant,
    reply: oneshot::Sender<Result<CoapPayload, RequestError>>,
}

/// Outcome of allocating and registering a new pending request.
pub struct Begun {
    /// Message ID assigned to this request.
    pub message_id: u16,
    /// Receiver that resolves exactly once: on response, timeout,
    /// cancellation, or disconnect.
    pub waiter: oneshot::Receiver<Result<CoapPayload, RequestError>>,
}

/// Maps outstanding request message IDs to waiters, enforcing the "settle
/// exactly once" invariant.
#[derive(Default)]
pub struct RequestTracker {
    allocator: MessageIdAllocator,
    pending: HashMap<u16, PendingEntry>,
}

impl RequestTracker {
    /// Create an empty tracker with a randomly seeded allocator.
    #[must_use]
    pub fn new() -> Self {
        Self { allocator: MessageIdAllocator::new(), pending: HashMap::new() }
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Allocate a message ID and register a pending entry. The caller is
    /// responsible for building and writing the wire bytes and for arming
    /// the timeout that eventually calls [`on_timeout`](Self::on_timeout).
    pub fn begin(&mut self, method: CoapMethod, uri: String, now: Instant) -> Begun {
        let message_id = self.allocator.allocate(&self.pending);
        let (reply, waiter) = oneshot::channel();
        self.pending.insert(message_id, PendingEntry { method, uri, created_at: now, reply });
        Begun { message_id, waiter }
    }

    /// Match a parsed CoAP response against its pending request. Returns
    /// `false` if no pending entry used this message ID (logged and dropped
    /// by the caller).
    pub fn on_response(&mut self, parsed: &ParsedCoap) -> bool {
        let Some(entry) = self.pending.remove(&parsed.message_id) else {
            return false;
        };
        let result = if parsed.code_class() == 2 {
            Ok(parsed.payload.clone())
        } else {
            Err(RequestError::Coap {
                code: parsed.code,
                code_name: parsed.code_name(),
                payload: parsed.payload.clone(),
            })
        };
        let _ = entry.reply.send(result);
        true
    }

    /// Reject a pending request as timed out. Returns `false` if it already
    /// settled (response arrived first, or it was cancelled).
    pub fn on_timeout(&mut self, message_id: u16) -> bool {
        let Some(entry) = self.pending.remove(&message_id) else {
            return false;
        };
        let elapsed = entry.created_at.elapsed();
        let _ = entry.reply.send(Err(RequestError::Timeout {
            method: format!("{:?}", entry.method),
            uri: entry.uri,
            elapsed,
        }));
        true
    }

    /// Reject a pending request as cancelled. Pure extension beyond timeout:
    /// rejects with [`RequestError::Cancelled`], distinct from a timeout or a
    /// disconnect.
    pub fn cancel(&mut self, message_id: u16) -> bool {
        let Some(entry) = self.pending.remove(&message_id) else {
            return false;
        };
        let _ = entry.reply.send(Err(RequestError::Cancelled));
        true
    }

    /// Reject every pending waiter with [`RequestError::Disconnected`] and
    /// clear the map. Returns the number of waiters rejected.
    pub fn on_disconnect(&mut self) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            let _ = entry.reply.send(Err(RequestError::Disconnected));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use mup1_proto::{CoapMessageType, CoapMethod};

    use super::*;

    fn response(message_id: u16, code: u8) -> ParsedCoap {
        ParsedCoap {
            version: 1,
            message_type: CoapMessageType::Acknowledgement,
            code,
            message_id,
            payload: CoapPayload::None,
        }
    }

    /// Property 6: message-ID monotonicity (mod wrap), distinct across N
    /// sequential requests.
    #[test]
    fn message_ids_are_pairwise_distinct() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..500 {
            let begun = tracker.begin(CoapMethod::Get, "/c".into(), now);
            assert!(ids.insert(begun.message_id), "duplicate message id");
        }
    }

    /// S4 / Property 7: correlation — a response resolves exactly the
    /// request that sent its message ID, and injecting M2's response before
    /// M1's resolves only M2.
    #[tokio::test]
    async fn correlation_resolves_only_the_matching_waiter() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        let first = tracker.begin(CoapMethod::Get, "/c".into(), now);
        let second = tracker.begin(CoapMethod::Get, "/c".into(), now);
        assert_eq!(second.message_id, if first.message_id == 0xFFFF { 1 } else { first.message_id + 1 });

        assert!(tracker.on_response(&response(second.message_id, 69)));
        assert_eq!(tracker.pending_len(), 1);

        let second_result = second.waiter.await.expect("waiter settled");
        assert!(second_result.is_ok());

        let mut first_waiter = first.waiter;
        assert!(first_waiter.now_or_never_is_pending());
    }

    /// Property 8: timeout — rejects with `RequestError::Timeout`.
    #[tokio::test]
    async fn on_timeout_rejects_pending_waiter() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        let begun = tracker.begin(CoapMethod::Get, "/c".into(), now);

        assert!(tracker.on_timeout(begun.message_id));
        assert_eq!(tracker.pending_len(), 0);

        match begun.waiter.await.expect("waiter settled") {
            Err(RequestError::Timeout { method, uri, .. }) => {
                assert_eq!(method, "Get");
                assert_eq!(uri, "/c");
            },
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    /// Property 9: disconnect drain — K pending requests all reject with
    /// `Disconnected`, map is empty afterward.
    #[tokio::test]
    async fn on_disconnect_drains_all_pending() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        let waiters: Vec<_> =
            (0..5).map(|_| tracker.begin(CoapMethod::Get, "/c".into(), now)).collect();

        let rejected = tracker.on_disconnect();
        assert_eq!(rejected, 5);
        assert_eq!(tracker.pending_len(), 0);

        for begun in waiters {
            assert!(matches!(begun.waiter.await.expect("settled"), Err(RequestError::Disconnected)));
        }
    }

    #[test]
    fn unmatched_response_is_reported_as_not_found() {
        let mut tracker = RequestTracker::new();
        assert!(!tracker.on_response(&response(0xBEEF, 69)));
    }

    /// `cancel` rejects with `Cancelled`, distinct from `Disconnected`.
    #[tokio::test]
    async fn cancel_rejects_with_cancelled_not_disconnected() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        let begun = tracker.begin(CoapMethod::Get, "/c".into(), now);

        assert!(tracker.cancel(begun.message_id));
        assert_eq!(tracker.pending_len(), 0);
        assert!(matches!(begun.waiter.await.expect("settled"), Err(RequestError::Cancelled)));
    }

    trait PendingExt {
        fn now_or_never_is_pending(&mut self) -> bool;
    }

    impl PendingExt for oneshot::Receiver<Result<CoapPayload, RequestError>> {
        fn now_or_never_is_pending(&mut self) -> bool {
            // A pending oneshot::Receiver has no value ready yet; `try_recv`
            // returns `Empty` without consuming it.
            matches!(self.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        }
    }
}
