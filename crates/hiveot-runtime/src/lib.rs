//! HiveOT service runtime.
//!
//! - [`transport`]: UDS, TCP, TLS and WebSocket listeners, dialers and peer
//!   identity from client certificates
//! - [`capprovider`]: the exported-capability table each service embeds
//! - [`shell`]: command line, folders, config and socket of a service process
//! - [`signal`]: SIGINT/SIGTERM shutdown

pub mod capprovider;
pub mod serve;
pub mod shell;
pub mod signal;
pub mod transport;

pub use capprovider::{CapProvider, CAP_PROVIDER_INTERFACE_ID, LIST_CAPABILITIES};
pub use serve::serve_connections;
pub use shell::{ServiceArgs, ServiceShell};
pub use signal::{exit_on_signal, wait_for_signal};
pub use transport::{
    dial, listen_tcp, listen_uds, DialOptions, Incoming, PeerIdentity, StreamListener, TlsCert,
};
