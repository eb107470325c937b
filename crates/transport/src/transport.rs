//! Connection and turn transports
//!
//! [`EventTransport`] wraps one [`EventSink`] behind a single closed flag.
//! [`ScopedTransport`] gives each turn its own flag over a shared connection
//! so cancelling a turn silences its late events while the connection stays
//! open for the next turn.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use voice_journal_core::OutboundEvent;

use crate::traits::{EventSender, EventSink};

/// Connection-level transport
pub struct EventTransport {
    label: String,
    sink: Box<dyn EventSink>,
    closed: AtomicBool,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl EventTransport {
    pub fn new(label: impl Into<String>, sink: impl EventSink + 'static) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            sink: Box::new(sink),
            closed: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Child view for one turn
    pub fn scope(self: &Arc<Self>) -> Arc<ScopedTransport> {
        Arc::new(ScopedTransport {
            parent: Arc::clone(self),
            closed: AtomicBool::new(false),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Events that reached the sink
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Events discarded because the transport was closed
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn mark_closed(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn discard(&self, event: &OutboundEvent) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            transport = %self.label,
            kind = event.kind().as_str(),
            "Discarding event on closed transport"
        );
    }
}

impl EventSender for EventTransport {
    fn send(&self, event: OutboundEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.discard(&event);
            return false;
        }

        match self.sink.write(&event) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                // Peer went away on its own; the channel is already gone.
                if self.mark_closed() {
                    tracing::debug!(transport = %self.label, error = %e, "Peer closed transport");
                }
                self.discard(&event);
                false
            }
        }
    }

    fn close(&self) -> bool {
        if !self.mark_closed() {
            return false;
        }
        self.sink.shutdown();
        tracing::debug!(
            transport = %self.label,
            sent = self.sent_count(),
            "Transport closed"
        );
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Per-turn view over a connection transport
pub struct ScopedTransport {
    parent: Arc<EventTransport>,
    closed: AtomicBool,
}

impl ScopedTransport {
    pub fn parent(&self) -> &Arc<EventTransport> {
        &self.parent
    }
}

impl EventSender for ScopedTransport {
    fn send(&self, event: OutboundEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.parent.discard(&event);
            return false;
        }
        self.parent.send(event)
    }

    /// Closes the turn only; the connection stays open
    fn close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.parent.is_closed()
    }
}
