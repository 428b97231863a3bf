//! RPC method handlers for the one-shot (HTTP) path.
//!
//! Dispatches JSON-RPC calls to the synthetic chain state, bounded by the current
//! readiness snapshot.

use axum::http::StatusCode;
use thiserror::Error;
use tracing::{debug, error};

use crate::chain;
use crate::context::AppContext;

use super::codec::{CodecError, FrameRead, FrameWrite};
use super::protocol::Message;

/// Why a one-shot request could not be answered.
///
/// None of these produce an RPC error object; the transport reports them as a status.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not read data from request: {0}")]
    Read(#[source] CodecError),
    #[error("could not write response: {0}")]
    Write(#[source] CodecError),
    #[error("request batch is empty")]
    EmptyBatch,
    #[error("can only serve RPC call types via HTTP, got {0:?}")]
    NotACall(String),
    #[error("unrecognized method {0}")]
    UnknownMethod(String),
    #[error("eth_call parameters match no known function selector")]
    UnknownSelector,
    #[error("could not encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    /// The transport-level status reported for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::UnknownMethod(_) | DispatchError::UnknownSelector => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handles RPC method dispatch and execution.
pub struct MethodHandler {
    ctx: AppContext,
}

impl MethodHandler {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Serve one request from a one-shot codec: read one frame, answer its first call with
    /// exactly one response frame.
    pub async fn serve<C>(&self, codec: &mut C) -> Result<(), DispatchError>
    where
        C: FrameRead + FrameWrite,
    {
        let result = self.serve_inner(codec).await;
        codec.close().await;

        if let Err(e) = &result {
            error!(error = %e, status = %e.status(), "Could not respond to HTTP request");
        }
        result
    }

    async fn serve_inner<C>(&self, codec: &mut C) -> Result<(), DispatchError>
    where
        C: FrameRead + FrameWrite,
    {
        let batch = codec.read().await.map_err(DispatchError::Read)?;
        let request = batch.into_first().ok_or(DispatchError::EmptyBatch)?;
        if !request.is_call() {
            return Err(DispatchError::NotACall(request.method));
        }

        debug!(method = %request.method, "Received HTTP-RPC request");
        let response = self.handle(&request).await?;
        codec.write(&response).await.map_err(DispatchError::Write)
    }

    /// Build the response to a single call.
    pub async fn handle(&self, request: &Message) -> Result<Message, DispatchError> {
        match request.method.as_str() {
            "eth_getBlockByNumber" => Ok(request.response(chain::header_by_number())?),
            "eth_getBlockByHash" => {
                Ok(request.response(chain::header_by_hash(self.ctx.genesis_time))?)
            }
            "eth_getLogs" => {
                let snapshot = self.ctx.readiness.snapshot().await;
                Ok(request.response(snapshot.logs())?)
            }
            "eth_call" => self.eth_call(request).await,
            other => Err(DispatchError::UnknownMethod(other.to_string())),
        }
    }

    /// `eth_call` against the deposit contract, told apart by the function selector in
    /// the call data.
    async fn eth_call(&self, request: &Message) -> Result<Message, DispatchError> {
        let params = request.params_text();
        let snapshot = self.ctx.readiness.snapshot().await;

        if params.contains(chain::DEPOSIT_COUNT_SELECTOR) {
            let count = chain::deposit_count(snapshot.deposits());
            let packed = chain::pack_deposit_count(&count);
            return Ok(request.response(chain::to_hex(&packed))?);
        }

        if params.contains(chain::DEPOSIT_ROOT_SELECTOR) {
            let root = chain::deposit_root(snapshot.deposits());
            return Ok(request.response(chain::to_hex(&root))?);
        }

        Err(DispatchError::UnknownSelector)
    }
}
