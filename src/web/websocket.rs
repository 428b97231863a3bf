//! Persistent codec over an upgraded WebSocket connection.

use async_trait::async_trait;
use axum::{
    extract::ws::{Message as Frame, WebSocket},
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::WebState;
use crate::rpc::{Batch, CodecError, FrameRead, FrameWrite, Message, serve_session};

/// Read half of a WebSocket connection.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
    closed: CancellationToken,
}

/// Write half of a WebSocket connection.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Frame>,
}

/// Split a socket into its codec halves and the signal that fires when it terminates.
pub fn split(socket: WebSocket) -> (WsReader, WsWriter, CancellationToken) {
    let closed = CancellationToken::new();
    let (sink, stream) = socket.split();
    (
        WsReader {
            stream,
            closed: closed.clone(),
        },
        WsWriter { sink },
        closed,
    )
}

impl WsReader {
    fn terminate(&self, err: CodecError) -> CodecError {
        self.closed.cancel();
        err
    }
}

#[async_trait]
impl FrameRead for WsReader {
    async fn read(&mut self) -> Result<Batch, CodecError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(self.terminate(CodecError::Transport(e))),
                None => return Err(self.terminate(CodecError::Closed)),
            };

            match frame {
                Frame::Text(text) => return Ok(Batch::decode(text.as_str().as_bytes())?),
                Frame::Binary(bytes) => return Ok(Batch::decode(&bytes)?),
                Frame::Close(_) => return Err(self.terminate(CodecError::Closed)),
                // Pings are answered by the socket itself
                Frame::Ping(_) | Frame::Pong(_) => continue,
            }
        }
    }
}

#[async_trait]
impl FrameWrite for WsWriter {
    async fn write(&mut self, msg: &Message) -> Result<(), CodecError> {
        let text = serde_json::to_string(msg).map_err(CodecError::Encode)?;
        self.sink.send(Frame::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// Handle WebSocket upgrade requests
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run a subscription session on an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: WebState) {
    debug!("WebSocket connection opened");
    let (reader, writer, closed) = split(socket);
    serve_session(reader, writer, closed, state.shutdown.clone(), state.session).await;
    debug!("WebSocket connection closed");
}
