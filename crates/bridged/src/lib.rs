//! ComfyUI development bridge daemon.
//!
//! Tails the ComfyUI log, watches plugin sources and answers tool calls
//! from a coding agent over JSON-RPC on stdio.

pub mod config;
pub mod host_client;
pub mod plugin_watcher;
pub mod poller;
pub mod rpc;
pub mod server;
pub mod state;
pub mod tools;
