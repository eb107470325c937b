//! Turn stream client
//!
//! Reads a turn's event stream, tracks the turn state machine and guards
//! playback with a generation counter so audio from a cancelled turn never
//! reaches the caller.

pub mod http;
pub mod reader;
pub mod sse;

pub use http::HttpTurnTransport;
pub use reader::{
    AudioSegment, DoneSummary, ReaderConfig, ReaderState, SendOutcome, StreamObserver,
    StreamReader,
};
pub use sse::{SseDecoder, SseMessage};

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

/// Client errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timed out waiting for the turn to finish")]
    Timeout,

    #[error("Stream ended before the turn finished")]
    StreamEnded,
}

/// Raw response body of one turn request
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Opens the event stream for one turn request
#[async_trait]
pub trait TurnTransport: Send + Sync {
    async fn open(&self, session_id: &str, text: &str) -> Result<ByteStream, ClientError>;
}
