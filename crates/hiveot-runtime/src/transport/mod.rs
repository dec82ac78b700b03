//! Listeners, dialers and peer identity.
//!
//! Every listener yields [`Incoming`] connections: a frame transport plus the
//! identity taken from the peer's client certificate, if one was presented.
//! Servers are written against [`StreamListener`] and do not care whether the
//! bytes arrive over a Unix socket, TCP, TLS or a WebSocket.

pub mod dial;
pub mod listener;
pub mod peer;
pub mod tls;
pub mod ws;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use hiveot_rpc::FrameTransport;
use tokio::task::JoinHandle;

pub use dial::{dial, DialOptions, DialTarget};
pub use listener::{listen_tcp, listen_uds, TcpStreamListener, UdsListener};
pub use peer::{cert_summary_der, cert_summary_pem, peer_identity, verify_signed_by, CertSummary, PeerIdentity};
pub use tls::{client_config, load_ca_cert, server_config, wrap_tls, TlsCert, TlsListener};
pub use ws::{wrap_wss, WsListener, DEFAULT_WS_PATH};

/// Default timeout for dialing a service or the gateway.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on a TLS handshake of an accepted connection.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// An accepted connection.
pub struct Incoming {
    pub transport: FrameTransport,
    /// Identity from the peer certificate. `None` when no certificate was given.
    pub peer: Option<PeerIdentity>,
    pub remote_addr: String,
}

/// Source of accepted connections.
#[async_trait]
pub trait StreamListener: Send + 'static {
    /// Wait for the next connection. An error means the listener is closed.
    async fn accept(&mut self) -> io::Result<Incoming>;

    fn local_addr(&self) -> String;
}

/// Aborts a background task when dropped.
pub(crate) struct TaskGuard(pub(crate) JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(crate) fn listener_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "listener closed")
}

/// Transient accept errors are skipped; anything else is logged and slowed down.
pub(crate) async fn handle_accept_error(e: io::Error) {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    ) {
        return;
    }

    tracing::error!(error = %e, "accept error");
    tokio::time::sleep(Duration::from_secs(1)).await;
}
