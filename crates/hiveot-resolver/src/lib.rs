//! HiveOT capability resolver.
//!
//! The resolver watches the run directory for service sockets, keeps one
//! connection per service and serves the union of their exported
//! capabilities on `resolver.socket`. Calls to methods it does not implement
//! are forwarded byte for byte to the owning service.

pub mod api;
pub mod client;
pub mod config;
pub mod inventory;
pub mod resolver;
pub mod watcher;

pub use api::{FindCapabilityArgs, ResolverStatus, ScanReport, SERVICE_ID};
pub use client::ResolverClient;
pub use config::ResolverConfig;
pub use inventory::{normalize_capabilities, CapabilityInventory, ConnectionState, ServiceConnection};
pub use resolver::CapResolver;
pub use watcher::{SocketEvent, SocketEventKind, SocketWatcher};
