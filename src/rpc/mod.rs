//! JSON-RPC core shared by both listeners.
//!
//! ## Architecture
//!
//! - `protocol`: JSON-RPC 2.0 message types
//! - `codec`: the read/write abstraction both transports implement
//! - `methods`: one-shot call dispatcher (HTTP)
//! - `session`: per-connection event loop with push notifications (WebSocket)

pub mod codec;
pub mod methods;
pub mod protocol;
pub mod session;

pub use codec::{Batch, CodecError, FrameRead, FrameWrite};
pub use methods::{DispatchError, MethodHandler};
pub use protocol::{Message, RpcError};
pub use session::{SessionConfig, serve_session};
