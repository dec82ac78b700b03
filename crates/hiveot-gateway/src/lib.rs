//! HiveOT gateway.
//!
//! Remote clients connect over TLS or WSS and get a session. A session starts
//! with the identity of the client certificate, or unauthenticated, and may
//! switch to a user identity through `Login`, `Refresh` or `Authenticate`.
//! Service methods are proxied to the resolver after a role check against the
//! capability inventory.

pub mod api;
pub mod client;
pub mod config;
pub mod gateway;
pub mod session;

pub use api::{ClientInfo, SERVICE_ID};
pub use client::GatewayClient;
pub use config::{GatewayConfig, DEFAULT_GATEWAY_PORT, DEFAULT_GATEWAY_WSS_PORT};
pub use gateway::{GatewayService, ResolverDialer, SessionGuard, UdsResolverDialer};
pub use session::{Session, SessionCap};

#[cfg(test)]
mod test_support;
