//! A mock eth1 node for exercising beacon chain clients.
//!
//! Serves a handful of JSON-RPC methods over HTTP and pushes synthetic chain heads over
//! WebSocket. Deposits become visible to `eth_getLogs` and `eth_call` as an operator
//! releases them on stdin.

pub mod chain;
pub mod config;
pub mod context;
pub mod core;
pub mod logging;
pub mod rpc;
pub mod web;
