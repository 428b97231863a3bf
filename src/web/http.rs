//! One-shot codec: one HTTP request body in, one response body out.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use super::WebState;
use crate::rpc::{Batch, CodecError, FrameRead, FrameWrite, Message};

/// Upper bound on a request body, to bound memory per request.
pub const MAX_REQUEST_CONTENT_LENGTH: usize = 1024 * 512;

/// Codec over a single HTTP exchange.
pub struct HttpCodec {
    body: Option<Body>,
    response: Option<Vec<u8>>,
}

impl HttpCodec {
    pub fn new(body: Body) -> Self {
        Self {
            body: Some(body),
            response: None,
        }
    }

    /// The written frame as an HTTP response.
    pub fn into_response(self) -> Response {
        match self.response {
            Some(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
            None => Response::default(),
        }
    }
}

#[async_trait]
impl FrameRead for HttpCodec {
    async fn read(&mut self) -> Result<Batch, CodecError> {
        let body = self.body.take().ok_or(CodecError::Closed)?;
        let bytes = axum::body::to_bytes(body, MAX_REQUEST_CONTENT_LENGTH).await?;
        Ok(Batch::decode(&bytes)?)
    }
}

#[async_trait]
impl FrameWrite for HttpCodec {
    async fn write(&mut self, msg: &Message) -> Result<(), CodecError> {
        if self.response.is_some() {
            return Err(CodecError::AlreadyWritten);
        }
        self.response = Some(serde_json::to_vec(msg).map_err(CodecError::Encode)?);
        Ok(())
    }
}

/// Serve one JSON-RPC call over HTTP. Failures are reported as a bare status code.
pub async fn rpc_handler(State(state): State<WebState>, body: Body) -> Response {
    let mut codec = HttpCodec::new(body);
    match state.handler.serve(&mut codec).await {
        Ok(()) => codec.into_response(),
        Err(e) => e.status().into_response(),
    }
}
