//! Codec abstraction shared by the one-shot and persistent transports.
//!
//! Both transports carry the same JSON encoding: one frame holds a single message or an
//! array of messages. The transports differ only in how frames arrive, so each provides
//! a `FrameRead` and a `FrameWrite` and the RPC layer works against those traits.

use async_trait::async_trait;
use thiserror::Error;

use super::protocol::Message;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame arrived but its content is not valid JSON-RPC. Recoverable.
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error("connection closed")]
    Closed,
    #[error("could not encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("response already written")]
    AlreadyWritten,
}

impl CodecError {
    /// Whether the connection can keep being read after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Decode(_))
    }
}

/// The messages decoded from one inbound frame: a single object, or a JSON array.
#[derive(Debug, Clone)]
pub struct Batch {
    pub messages: Vec<Message>,
}

impl Batch {
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        let first = frame.iter().find(|b| !b.is_ascii_whitespace());
        let messages: Vec<Message> = if first == Some(&b'[') {
            serde_json::from_slice(frame)?
        } else {
            vec![serde_json::from_slice(frame)?]
        };
        Ok(Self { messages })
    }

    /// The first message of the batch; the mock only ever serves that one.
    pub fn into_first(self) -> Option<Message> {
        self.messages.into_iter().next()
    }
}

/// Read half of a codec.
#[async_trait]
pub trait FrameRead: Send {
    /// Wait for the next frame and decode it.
    async fn read(&mut self) -> Result<Batch, CodecError>;
}

/// Write half of a codec. Only one task may own it.
#[async_trait]
pub trait FrameWrite: Send {
    /// Encode and send one message as one frame.
    async fn write(&mut self, msg: &Message) -> Result<(), CodecError>;

    /// Release the transport. A no-op unless the transport holds something to release.
    async fn close(&mut self) {}
}
