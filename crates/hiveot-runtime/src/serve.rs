//! Accept loop shared by every RPC server.

use std::future::Future;
use std::sync::Arc;

use hiveot_kernel::HubResult;
use hiveot_rpc::{Client, RpcConnection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{PeerIdentity, StreamListener};

/// Accept connections from `listener` until it closes or `shutdown` fires.
///
/// Each connection gets its own task. `bootstrap` returns the capability
/// offered to the peer plus a guard value that is dropped right after the
/// connection has closed; servers use it to release per-connection state. A
/// bootstrap error drops that connection only. On shutdown all connections
/// opened here are closed.
pub async fn serve_connections<L, F, Fut, G>(
    name: &str,
    mut listener: L,
    shutdown: CancellationToken,
    bootstrap: F,
) -> HubResult<()>
where
    L: StreamListener,
    F: Fn(Option<PeerIdentity>, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HubResult<(Client, G)>> + Send + 'static,
    G: Send + 'static,
{
    let bootstrap = Arc::new(bootstrap);
    info!("{name}: serving on {}", listener.local_addr());
    loop {
        let incoming = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(incoming) => incoming,
                Err(err) => {
                    debug!("{name}: listener closed: {err}");
                    break;
                }
            },
        };
        let remote = incoming.remote_addr.clone();
        let conn_name = format!("{name}<-{remote}");
        let bootstrap = Arc::clone(&bootstrap);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let (client, guard) = match bootstrap(incoming.peer, remote.clone()).await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(remote_addr = %remote, error = %err, "refusing connection");
                    return;
                }
            };
            let conn = RpcConnection::new(conn_name, incoming.transport, Some(client));
            tokio::select! {
                _ = conn.closed() => debug!(remote_addr = %remote, "connection closed"),
                _ = shutdown.cancelled() => conn.close(),
            }
            drop(conn);
            drop(guard);
        });
    }
    info!("{name}: stopped");
    Ok(())
}
