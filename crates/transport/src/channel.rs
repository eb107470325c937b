//! Channel-backed sink
//!
//! Bridges the synchronous [`EventSink`] interface to an async writer task
//! (an SSE body stream or a WebSocket writer loop) through an unbounded
//! channel. Shutdown drops the sender, which ends the reader side.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use voice_journal_core::OutboundEvent;

use crate::traits::EventSink;
use crate::TransportError;

type Encoder<T> = Box<dyn Fn(&OutboundEvent) -> Result<T, TransportError> + Send + Sync>;

pub struct ChannelSink<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    encode: Encoder<T>,
}

impl<T: Send + 'static> ChannelSink<T> {
    /// Sink that encodes each event into a frame before queueing it
    pub fn new<F>(encode: F) -> (Self, mpsc::UnboundedReceiver<T>)
    where
        F: Fn(&OutboundEvent) -> Result<T, TransportError> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(tx, encode), rx)
    }

    /// Sink over an existing channel; other senders on it stay usable for
    /// frames outside the event protocol
    pub fn with_sender<F>(tx: mpsc::UnboundedSender<T>, encode: F) -> Self
    where
        F: Fn(&OutboundEvent) -> Result<T, TransportError> + Send + Sync + 'static,
    {
        Self {
            tx: Mutex::new(Some(tx)),
            encode: Box::new(encode),
        }
    }
}

impl ChannelSink<OutboundEvent> {
    /// Sink that queues events unencoded
    pub fn events() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        Self::new(|event| Ok(event.clone()))
    }
}

impl<T: Send + 'static> EventSink for ChannelSink<T> {
    fn write(&self, event: &OutboundEvent) -> Result<(), TransportError> {
        let frame = (self.encode)(event)?;
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn shutdown(&self) {
        self.tx.lock().take();
    }
}
