//! HiveOT capability RPC.
//!
//! A small capability-passing RPC tailored to the hub:
//!
//! - [`payload::Payload`]: opaque content plus a table of embedded capabilities
//! - [`client::Client`]: a clonable capability handle
//! - [`server::Server`]: local dispatch with an unknown-method hook
//! - [`connection::RpcConnection`]: export/import tables over a framed transport
//! - [`forward::Forwarder`]: byte-for-byte call forwarding for proxies

pub mod client;
pub mod connection;
pub mod forward;
pub mod message;
pub mod method;
pub mod payload;
pub mod server;
pub mod transport;

pub use client::{Client, ClientHook};
pub use connection::{RpcConnection, BOOTSTRAP_EXPORT_ID};
pub use forward::Forwarder;
pub use method::{MethodCall, MethodDescriptor, MethodInfo};
pub use payload::{CapRef, Payload};
pub use server::{Server, ServerBuilder, UnknownMethodHandler};
pub use transport::{FrameSink, FrameStream, FrameTransport};
