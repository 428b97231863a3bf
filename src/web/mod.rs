//! Network listeners.
//!
//! Two independent listeners share one readiness state:
//!
//! - HTTP (`http`): one JSON-RPC call per request, answered from the chain state
//! - WebSocket (`websocket`): long-lived sessions that receive pushed chain heads
//!
//! Both accept any path.

mod http;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::rpc::{MethodHandler, SessionConfig};

pub use http::{HttpCodec, MAX_REQUEST_CONTENT_LENGTH};
pub use websocket::{WsReader, WsWriter};

/// Shared state for both listeners
#[derive(Clone)]
pub struct WebState {
    pub handler: Arc<MethodHandler>,
    pub session: SessionConfig,
    pub shutdown: CancellationToken,
}

/// The mock node: an HTTP listener and a WebSocket listener.
pub struct MockServer {
    http: TcpListener,
    ws: TcpListener,
    state: WebState,
}

impl MockServer {
    /// Bind both listeners. Fails before anything is served if either address is taken.
    pub async fn bind(ctx: AppContext) -> Result<Self> {
        let http_addr = ctx.config.http_addr();
        let ws_addr = ctx.config.ws_addr();

        let http = TcpListener::bind(http_addr)
            .await
            .with_context(|| format!("Could not bind HTTP listener on {}", http_addr))?;
        let ws = TcpListener::bind(ws_addr)
            .await
            .with_context(|| format!("Could not bind WebSocket listener on {}", ws_addr))?;

        let state = WebState {
            session: ctx.config.session(),
            handler: Arc::new(MethodHandler::new(ctx)),
            shutdown: CancellationToken::new(),
        };

        Ok(Self { http, ws, state })
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http.local_addr()?)
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        Ok(self.ws.local_addr()?)
    }

    /// Token that stops both listeners and every open session when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn start(self) -> Result<()> {
        let Self {
            http: http_listener,
            ws: ws_listener,
            state,
        } = self;
        tracing::info!(addr = %http_listener.local_addr()?, "Starting HTTP listener");
        tracing::info!(addr = %ws_listener.local_addr()?, "Starting WebSocket listener");

        let http_app = Router::new()
            .fallback(http::rpc_handler)
            .with_state(state.clone());
        let ws_app = Router::new()
            .fallback(websocket::ws_handler)
            .with_state(state.clone());

        let http_shutdown = state.shutdown.clone().cancelled_owned();
        let ws_shutdown = state.shutdown.clone().cancelled_owned();

        let serve_http = async move {
            axum::serve(http_listener, http_app)
                .with_graceful_shutdown(http_shutdown)
                .await
                .context("HTTP listener failed")
        };
        let serve_ws = async move {
            axum::serve(ws_listener, ws_app)
                .with_graceful_shutdown(ws_shutdown)
                .await
                .context("WebSocket listener failed")
        };

        tokio::try_join!(serve_http, serve_ws)?;
        tracing::info!("Listeners shut down");
        Ok(())
    }
}
