//! The gateway service: accepts client connections and gives each one a
//! [`Session`] with its own channel to the resolver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use hiveot_authn::{CredentialStore, SessionAuth};
use hiveot_kernel::HubResult;
use hiveot_resolver::ResolverClient;
use hiveot_rpc::Client;
use hiveot_runtime::{serve_connections, PeerIdentity, StreamListener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::ClientInfo;
use crate::session::Session;

// ─────────────────────────────────────────────────────────────────────────────
// Resolver channels
// ─────────────────────────────────────────────────────────────────────────────

/// Opens the resolver channel of a new session.
#[async_trait]
pub trait ResolverDialer: Send + Sync + 'static {
    async fn connect(&self) -> HubResult<ResolverClient>;
}

/// Dials a fresh connection to the resolver socket for every session.
pub struct UdsResolverDialer {
    socket_path: PathBuf,
    timeout: Duration,
}

impl UdsResolverDialer {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ResolverDialer for UdsResolverDialer {
    async fn connect(&self) -> HubResult<ResolverClient> {
        ResolverClient::connect(&self.socket_path, self.timeout).await
    }
}

/// Shares one resolver client between sessions, for an in-process resolver.
#[async_trait]
impl ResolverDialer for ResolverClient {
    async fn connect(&self) -> HubResult<ResolverClient> {
        Ok(self.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Releases its session when the client connection ends.
pub struct SessionGuard {
    session: Arc<Session>,
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(self.session.id());
        self.session.release();
    }
}

/// Clonable handle of the gateway.
#[derive(Clone)]
pub struct GatewayService {
    auth: Arc<SessionAuth>,
    store: Arc<dyn CredentialStore>,
    dialer: Arc<dyn ResolverDialer>,
    sessions: Arc<DashMap<String, Arc<Session>>>,
}

impl GatewayService {
    pub fn new(auth: Arc<SessionAuth>, store: Arc<dyn CredentialStore>, dialer: Arc<dyn ResolverDialer>) -> Self {
        Self {
            auth,
            store,
            dialer,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn auth(&self) -> &SessionAuth {
        &self.auth
    }

    /// Start a session for a connected peer. Fails when the resolver cannot be
    /// reached, in which case the connection is dropped.
    pub async fn open_session(&self, peer: Option<PeerIdentity>, remote_addr: String) -> HubResult<(Client, SessionGuard)> {
        let resolver = self.dialer.connect().await?;
        let session = Session::new(
            Uuid::new_v4().to_string(),
            remote_addr,
            peer.as_ref(),
            resolver,
            Arc::clone(&self.auth),
            Arc::clone(&self.store),
        );
        let info = session.client_info();
        info!(
            session_id = %session.id(),
            remote_addr = %session.remote_addr(),
            client_id = %info.client_id,
            auth_type = %info.auth_type,
            "session opened"
        );
        self.sessions.insert(session.id().to_string(), Arc::clone(&session));
        let bootstrap = session.bootstrap();
        Ok((
            bootstrap,
            SessionGuard {
                session,
                sessions: Arc::clone(&self.sessions),
            },
        ))
    }

    /// Serve sessions on `listener` until it closes or `shutdown` fires.
    pub async fn serve<L: StreamListener>(&self, listener: L, shutdown: CancellationToken) -> HubResult<()> {
        let gateway = self.clone();
        serve_connections("gateway", listener, shutdown, move |peer, remote_addr| {
            let gateway = gateway.clone();
            async move { gateway.open_session(peer, remote_addr).await }
        })
        .await
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Identities of the open sessions.
    pub fn sessions(&self) -> Vec<ClientInfo> {
        self.sessions.iter().map(|entry| entry.value().client_info()).collect()
    }

    /// Release every open session.
    pub fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.release();
            }
        }
        debug!("all sessions released");
    }
}
