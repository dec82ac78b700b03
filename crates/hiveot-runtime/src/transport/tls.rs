//! TLS listener and configs (rustls + tokio-rustls).
//!
//! Servers ask for a client certificate but do not require one: a peer without a
//! certificate connects as unauthenticated, a peer with one must chain to the hub
//! CA. TLS 1.3 is preferred, TLS 1.2 is the minimum.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hiveot_kernel::{HubError, HubResult};
use hiveot_rpc::FrameTransport;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use super::listener::TcpStreamListener;
use super::peer::{peer_identity, PeerIdentity};
use super::{handle_accept_error, listener_closed, Incoming, StreamListener, TaskGuard, HANDSHAKE_TIMEOUT};

const PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

pub(crate) const ACCEPT_BACKLOG: usize = 64;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_err(e: impl std::fmt::Display) -> HubError {
    HubError::invalid_input(format!("TLS configuration: {e}"))
}

/// Certificate chain and private key of one end of a TLS connection.
#[derive(Debug)]
pub struct TlsCert {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Clone for TlsCert {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl TlsCert {
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> HubResult<Self> {
        let chain = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HubError::invalid_input(format!("certificate PEM: {e}")))?;
        if chain.is_empty() {
            return Err(HubError::invalid_input("certificate PEM contained no certificates"));
        }
        let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes())
            .map_err(|e| HubError::invalid_input(format!("key PEM: {e}")))?;
        Ok(Self { chain, key })
    }

    pub fn load(cert_path: &Path, key_path: &Path) -> HubResult<Self> {
        let cert_pem = std::fs::read_to_string(cert_path)
            .map_err(|e| HubError::not_found(format!("{}: {e}", cert_path.display())))?;
        let key_pem = std::fs::read_to_string(key_path)
            .map_err(|e| HubError::not_found(format!("{}: {e}", key_path.display())))?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }
}

/// Parse the CA certificate PEM.
pub fn load_ca_cert(ca_pem: &str) -> HubResult<CertificateDer<'static>> {
    CertificateDer::from_pem_slice(ca_pem.as_bytes())
        .map_err(|e| HubError::invalid_input(format!("CA certificate PEM: {e}")))
}

fn root_store(ca_cert: &CertificateDer<'static>) -> HubResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.add(ca_cert.clone()).map_err(tls_err)?;
    Ok(roots)
}

/// Server config with optional, CA-verified client certificates.
pub fn server_config(server_cert: &TlsCert, ca_cert: &CertificateDer<'static>) -> HubResult<Arc<ServerConfig>> {
    let provider = provider();
    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(root_store(ca_cert)?), Arc::clone(&provider))
            .allow_unauthenticated()
            .build()
            .map_err(tls_err)?;
    let config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(PROTOCOL_VERSIONS)
        .map_err(tls_err)?
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_cert.chain.clone(), server_cert.key.clone_key())
        .map_err(tls_err)?;
    Ok(Arc::new(config))
}

/// Client config trusting only the hub CA.
pub fn client_config(
    ca_cert: &CertificateDer<'static>,
    client_cert: Option<&TlsCert>,
) -> HubResult<Arc<ClientConfig>> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(PROTOCOL_VERSIONS)
        .map_err(tls_err)?
        .with_root_certificates(root_store(ca_cert)?);
    let config = match client_cert {
        Some(cert) => builder
            .with_client_auth_cert(cert.chain.clone(), cert.key.clone_key())
            .map_err(tls_err)?,
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

/// TLS listener. Handshakes run concurrently in the background so one slow
/// client cannot stall the accept loop.
pub struct TlsListener {
    rx: mpsc::Receiver<Incoming>,
    local_addr: SocketAddr,
    _task: TaskGuard,
}

/// Wrap a TCP listener in TLS.
pub fn wrap_tls(listener: TcpStreamListener, config: Arc<ServerConfig>) -> HubResult<TlsListener> {
    TlsListener::new(listener.into_inner(), config)
}

impl TlsListener {
    pub fn new(listener: TcpListener, config: Arc<ServerConfig>) -> HubResult<Self> {
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        let task = tokio::spawn(accept_loop(listener, TlsAcceptor::from(config), tx));
        info!("listening on tls://{local_addr}");
        Ok(Self {
            rx,
            local_addr,
            _task: TaskGuard(task),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(listener: TcpListener, acceptor: TlsAcceptor, tx: mpsc::Sender<Incoming>) {
    loop {
        let (tcp, addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                handle_accept_error(e).await;
                continue;
            }
        };
        if tx.is_closed() {
            return;
        }
        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let Some((tls, peer)) = handshake(&acceptor, tcp, addr).await else {
                return;
            };
            let incoming = Incoming {
                transport: FrameTransport::from_io(tls),
                peer,
                remote_addr: addr.to_string(),
            };
            let _ = tx.send(incoming).await;
        });
    }
}

/// Server side TLS handshake plus peer identity. Failures are logged and the
/// connection dropped.
pub(crate) async fn handshake(
    acceptor: &TlsAcceptor,
    tcp: TcpStream,
    addr: SocketAddr,
) -> Option<(TlsStream<TcpStream>, Option<PeerIdentity>)> {
    let tls = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(tcp)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(err)) => {
            warn!(remote_addr = %addr, error = %err, "TLS handshake failed");
            return None;
        }
        Err(_) => {
            warn!(remote_addr = %addr, "TLS handshake timed out");
            return None;
        }
    };
    match peer_identity(tls.get_ref().1.peer_certificates()) {
        Ok(peer) => Some((tls, peer)),
        Err(err) => {
            warn!(remote_addr = %addr, error = %err, "rejecting peer certificate");
            None
        }
    }
}

#[async_trait]
impl StreamListener for TlsListener {
    async fn accept(&mut self) -> io::Result<Incoming> {
        self.rx.recv().await.ok_or_else(listener_closed)
    }

    fn local_addr(&self) -> String {
        self.local_addr.to_string()
    }
}
