//! Per-connection event loop for the persistent (WebSocket) transport.
//!
//! Each session runs two tasks:
//!
//! - the reader decodes inbound frames and forwards them; it never writes
//! - the dispatcher owns the write half: it answers forwarded frames, replies to
//!   malformed ones with an RPC error, and pushes a new chain head on every timer tick
//!
//! Any inbound call is treated as `eth_subscribe`. Only the latest subscription id is
//! tracked, and notifications are pushed whether or not a subscription exists yet.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::chain;

use super::codec::{Batch, CodecError, FrameRead, FrameWrite};
use super::protocol::{INVALID_REQUEST, Message, SUBSCRIPTION_METHOD, SubscriptionResult};

/// Interval between pushed chain heads.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Decoded frames buffered between reader and dispatcher.
const READ_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// What the reader hands to the dispatcher.
enum Inbound {
    Batch(Batch),
    Malformed(serde_json::Error),
}

/// State owned by the dispatcher role.
#[derive(Debug, Default)]
struct Session {
    block_num: u64,
    subscription: Option<String>,
}

/// Run a session until the connection closes or `shutdown` fires.
///
/// `closed` is the transport's termination signal. Both roles have exited when this
/// returns.
pub async fn serve_session<R, W>(
    reader: R,
    writer: W,
    closed: CancellationToken,
    shutdown: CancellationToken,
    config: SessionConfig,
) where
    R: FrameRead + 'static,
    W: FrameWrite + 'static,
{
    let close = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(READ_QUEUE_DEPTH);
    let (failed_tx, failed_rx) = mpsc::channel(1);

    let reader_task = tokio::spawn(read_loop(
        reader,
        inbound_tx,
        failed_tx,
        close.clone(),
        closed.clone(),
    ));
    let dispatch_task = tokio::spawn(dispatch_loop(
        writer,
        inbound_rx,
        failed_rx,
        close.clone(),
        config.tick_interval,
    ));

    tokio::select! {
        _ = closed.cancelled() => debug!("Connection closed"),
        _ = shutdown.cancelled() => debug!("Server shutting down, closing session"),
    }
    close.cancel();

    let (reader_result, dispatch_result) = tokio::join!(reader_task, dispatch_task);
    if let Err(e) = reader_result.and(dispatch_result.map(drop)) {
        error!(error = %e, "Session task failed");
    }
}

async fn read_loop<R: FrameRead>(
    mut reader: R,
    inbound: mpsc::Sender<Inbound>,
    failed: mpsc::Sender<CodecError>,
    close: CancellationToken,
    closed: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = close.cancelled() => return,
            result = reader.read() => result,
        };

        let event = match result {
            Ok(batch) => Inbound::Batch(batch),
            Err(CodecError::Decode(e)) => Inbound::Malformed(e),
            Err(e) => {
                let _ = failed.send(e).await;
                closed.cancel();
                return;
            }
        };

        if inbound.send(event).await.is_err() {
            return;
        }
    }
}

/// Runs until `close` fires or the reader reports a failure. Returns that failure, if any.
///
/// A queued read failure wins over `close`: the reader reports it before signalling the
/// connection closed, so it is always logged.
async fn dispatch_loop<W: FrameWrite>(
    mut writer: W,
    mut inbound: mpsc::Receiver<Inbound>,
    mut failed: mpsc::Receiver<CodecError>,
    close: CancellationToken,
    tick_interval: Duration,
) -> Option<CodecError> {
    let mut session = Session::default();
    let mut ticker = time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ended_by = loop {
        tokio::select! {
            biased;

            Some(err) = failed.recv() => {
                match &err {
                    CodecError::Closed => debug!("Peer closed the connection"),
                    err => error!(error = %err, "Could not read data from request"),
                }
                break Some(err);
            }
            _ = close.cancelled() => break None,
            _ = ticker.tick() => session.push_head(&mut writer).await,
            Some(event) = inbound.recv() => match event {
                Inbound::Batch(batch) => session.subscribe(&mut writer, batch).await,
                Inbound::Malformed(err) => session.reject(&mut writer, err).await,
            },
        }
    };

    writer.close().await;
    ended_by
}

impl Session {
    /// Push the chain head for the current block counter to the subscriber.
    async fn push_head<W: FrameWrite>(&mut self, writer: &mut W) {
        let params = SubscriptionResult {
            subscription: self.subscription.clone().unwrap_or_default(),
            result: chain::latest_chain_head(self.block_num),
        };
        let notification = match Message::notification(SUBSCRIPTION_METHOD, params) {
            Ok(notification) => notification,
            Err(e) => {
                error!(error = %e, "Could not encode chain head");
                return;
            }
        };

        if let Err(e) = writer.write(&notification).await {
            error!(error = %e, block_num = self.block_num, "Could not push chain head");
            return;
        }
        self.block_num += 1;
    }

    /// Register a new subscription for the first message of `batch` and answer it with
    /// the subscription id.
    async fn subscribe<W: FrameWrite>(&mut self, writer: &mut W, batch: Batch) {
        let Some(request) = batch.into_first() else {
            warn!("Received an empty batch");
            let response = Message::error_response(None, INVALID_REQUEST, "Empty batch");
            if let Err(e) = writer.write(&response).await {
                error!(error = %e, "Could not write error response");
            }
            return;
        };

        let id = new_subscription_id();
        debug!(method = %request.method, subscription = %id, "New subscription");
        self.subscription = Some(id.clone());

        let response = match request.response(&id) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Could not encode subscription response");
                return;
            }
        };
        if let Err(e) = writer.write(&response).await {
            error!(error = %e, "Could not write subscription response");
        }
    }

    /// Answer a malformed frame with a parse error.
    async fn reject<W: FrameWrite>(&mut self, writer: &mut W, err: serde_json::Error) {
        warn!(error = %err, "Received a malformed frame");
        if let Err(e) = writer.write(&Message::parse_error(&err)).await {
            error!(error = %e, "Could not write error response");
        }
    }
}

/// A fresh, unique subscription id in the `0x`-hex form Ethereum clients expect.
fn new_subscription_id() -> String {
    format!("0x{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::Value;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use crate::rpc::codec::testing::{ChannelReader, ChannelWriter};

    const TICK: Duration = Duration::from_millis(40);

    struct Harness {
        frames: mpsc::UnboundedSender<Result<Vec<u8>, CodecError>>,
        sent: mpsc::UnboundedReceiver<Message>,
        failing: Arc<AtomicBool>,
        closed: CancellationToken,
        shutdown: CancellationToken,
        session: JoinHandle<()>,
    }

    fn start(tick_interval: Duration) -> Harness {
        let (frames, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let failing = Arc::new(AtomicBool::new(false));
        let closed = CancellationToken::new();
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(serve_session(
            ChannelReader { frames: frames_rx },
            ChannelWriter {
                sent: sent_tx,
                failing: failing.clone(),
            },
            closed.clone(),
            shutdown.clone(),
            SessionConfig { tick_interval },
        ));

        Harness {
            frames,
            sent,
            failing,
            closed,
            shutdown,
            session,
        }
    }

    impl Harness {
        fn send(&self, frame: &str) {
            self.frames.send(Ok(frame.as_bytes().to_vec())).unwrap();
        }

        async fn next(&mut self) -> Message {
            timeout(Duration::from_secs(2), self.sent.recv())
                .await
                .expect("timeout waiting for message")
                .expect("session writer dropped")
        }

        /// Next message that is not a pushed chain head.
        async fn next_reply(&mut self) -> Message {
            loop {
                let msg = self.next().await;
                if !msg.is_notification() {
                    return msg;
                }
            }
        }
    }

    fn notification_params(msg: &Message) -> Value {
        serde_json::from_str(msg.params_text()).unwrap()
    }

    #[tokio::test]
    async fn each_call_gets_a_fresh_subscription_id() {
        let mut h = start(Duration::from_secs(60));

        h.send(r#"{"jsonrpc":"2.0","id":1,"method":"eth_subscribe","params":["newHeads"]}"#);
        let first = h.next_reply().await;
        h.send(r#"{"jsonrpc":"2.0","id":"two","method":"anything"}"#);
        let second = h.next_reply().await;

        assert_eq!(first.id, Some(1.into()));
        assert_eq!(second.id, Some("two".into()));
        let first_id = first.result.unwrap();
        let second_id = second.result.unwrap();
        assert!(first_id.as_str().unwrap().starts_with("0x"));
        assert_ne!(first_id, second_id);
    }

    #[tokio::test]
    async fn notifications_carry_the_latest_subscription() {
        let mut h = start(TICK);

        h.send(r#"{"jsonrpc":"2.0","id":1,"method":"eth_subscribe"}"#);
        let first_id = h.next_reply().await.result.unwrap();
        h.send(r#"{"jsonrpc":"2.0","id":2,"method":"eth_subscribe"}"#);
        let second_id = h.next_reply().await.result.unwrap();

        let head = loop {
            let msg = h.next().await;
            if msg.is_notification() {
                break msg;
            }
        };
        assert_eq!(head.method, SUBSCRIPTION_METHOD);
        let params = notification_params(&head);
        assert_eq!(params["subscription"], second_id);
        assert_ne!(params["subscription"], first_id);
    }

    #[tokio::test]
    async fn idle_session_receives_consecutive_heads() {
        let mut h = start(TICK);

        let mut numbers = Vec::new();
        for _ in 0..4 {
            let msg = h.next().await;
            let params = notification_params(&msg);
            assert_eq!(params["subscription"], "", "no subscription was made");
            numbers.push(params["result"]["number"].as_str().unwrap().to_string());
        }

        assert_eq!(numbers, vec!["0x0", "0x1", "0x2", "0x3"]);
    }

    #[tokio::test]
    async fn failed_push_does_not_consume_a_block_number() {
        let mut h = start(TICK);

        h.failing.store(true, Ordering::SeqCst);
        time::sleep(TICK * 3).await;
        h.failing.store(false, Ordering::SeqCst);

        let msg = h.next().await;
        assert_eq!(notification_params(&msg)["result"]["number"], "0x0");
        assert!(!h.session.is_finished(), "write failures must not end the session");
    }

    #[tokio::test]
    async fn malformed_frame_gets_one_error_and_session_stays_open() {
        let mut h = start(Duration::from_secs(60));

        h.send("{\"jsonrpc\": ");
        let error = h.next_reply().await;
        assert_eq!(error.error.unwrap().code, crate::rpc::protocol::PARSE_ERROR);

        h.send(r#"{"jsonrpc":"2.0","id":9,"method":"eth_subscribe"}"#);
        let reply = h.next_reply().await;
        assert_eq!(reply.id, Some(9.into()));
        assert!(reply.result.is_some());
        assert!(h.sent.try_recv().is_err(), "exactly one reply per frame");
    }

    #[tokio::test]
    async fn transport_error_ends_the_session() {
        let mut h = start(Duration::from_secs(60));

        h.frames
            .send(Err(CodecError::Transport(axum::Error::new(
                std::io::Error::from(std::io::ErrorKind::ConnectionReset),
            ))))
            .unwrap();
        let _ = h
            .frames
            .send(Ok(br#"{"jsonrpc":"2.0","id":1,"method":"eth_subscribe"}"#.to_vec()));

        timeout(Duration::from_secs(2), &mut h.session)
            .await
            .expect("session did not end")
            .unwrap();
        assert!(h.closed.is_cancelled());
        assert!(h.sent.recv().await.is_none(), "no frames after the transport error");
    }

    #[tokio::test]
    async fn queued_read_failure_is_reported_even_after_close() {
        let (_inbound_tx, inbound_rx) = mpsc::channel(1);
        let (failed_tx, failed_rx) = mpsc::channel(1);
        let (sent_tx, _sent) = mpsc::unbounded_channel();
        let close = CancellationToken::new();

        failed_tx
            .send(CodecError::Transport(axum::Error::new(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))))
            .await
            .unwrap();
        close.cancel();

        let writer = ChannelWriter {
            sent: sent_tx,
            failing: Arc::new(AtomicBool::new(false)),
        };
        let ended_by = timeout(
            Duration::from_secs(2),
            dispatch_loop(writer, inbound_rx, failed_rx, close, Duration::from_secs(60)),
        )
        .await
        .expect("dispatcher did not stop");

        assert!(matches!(ended_by, Some(CodecError::Transport(_))));
    }

    #[tokio::test]
    async fn close_without_read_failure_ends_quietly() {
        let (_inbound_tx, inbound_rx) = mpsc::channel(1);
        let (_failed_tx, failed_rx) = mpsc::channel(1);
        let (sent_tx, _sent) = mpsc::unbounded_channel();
        let close = CancellationToken::new();
        close.cancel();

        let writer = ChannelWriter {
            sent: sent_tx,
            failing: Arc::new(AtomicBool::new(false)),
        };
        let ended_by =
            dispatch_loop(writer, inbound_rx, failed_rx, close, Duration::from_secs(60)).await;

        assert!(ended_by.is_none());
    }

    #[tokio::test]
    async fn peer_close_ends_the_session() {
        let mut h = start(TICK);
        drop(h.frames);

        timeout(Duration::from_secs(2), h.session)
            .await
            .expect("session did not end")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_ends_the_session() {
        let h = start(TICK);
        h.shutdown.cancel();

        timeout(Duration::from_secs(2), h.session)
            .await
            .expect("session did not end")
            .unwrap();
    }

    #[test]
    fn subscription_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_subscription_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
