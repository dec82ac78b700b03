//! A complete hub in a temporary directory.
//!
//! The hub has its own CA, a certs service and a resolver scanning the run
//! folder, all on Unix sockets the way the service binaries lay them out. A
//! gateway is started on demand.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hiveot_authn::{MemoryCredentialStore, SessionAuth};
use hiveot_certs::{CertIssuer, CertsService, HubCa};
use hiveot_gateway::{GatewayService, UdsResolverDialer};
use hiveot_kernel::{AppFolders, AuthType, CertRole, HubError, HubResult};
use hiveot_resolver::{CapResolver, ResolverClient, ResolverConfig};
use hiveot_runtime::transport::{listen_tcp, listen_uds, load_ca_cert, server_config, wrap_tls, wrap_wss, DialOptions, TlsCert};
use rcgen::KeyPair;
use rustls_pki_types::CertificateDer;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::echo::EchoService;

pub const TEST_USER: &str = "alice";
pub const TEST_USER_PASSWORD: &str = "pw1";

const RESOLVER_SCAN_INTERVAL_MS: u64 = 200;
const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Running gateway of a [`TestHub`].
pub struct TestGateway {
    /// TLS over TCP, `tcp://127.0.0.1:<port>`.
    pub url: String,
    /// WebSocket over TLS.
    pub wss_url: String,
    pub service: GatewayService,
}

pub struct TestHub {
    home: TempDir,
    folders: AppFolders,
    issuer: CertIssuer,
    ca_cert: CertificateDer<'static>,
    resolver: CapResolver,
    shutdown: CancellationToken,
}

impl TestHub {
    /// Create the CA and start the certs service and the resolver.
    pub async fn start() -> HubResult<Self> {
        let home = tempfile::tempdir()?;
        let folders = AppFolders::from_home(home.path());
        for dir in [&folders.certs, &folders.run, &folders.config] {
            std::fs::create_dir_all(dir)?;
        }
        let ca = HubCa::create(1)?;
        ca.save(&folders)?;
        let ca_cert = load_ca_cert(ca.cert_pem())?;
        let issuer = CertIssuer::new(ca);
        let shutdown = CancellationToken::new();

        let certs = CertsService::new(issuer.clone()).provider()?;
        let certs_listener = listen_uds(&folders.socket_path(hiveot_certs::SERVICE_ID)).await?;
        let token = shutdown.clone();
        tokio::spawn(async move { certs.start(certs_listener, token).await });

        let config = ResolverConfig {
            scan_interval_ms: RESOLVER_SCAN_INTERVAL_MS,
            ..ResolverConfig::default()
        };
        let own_socket = folders.socket_path(hiveot_resolver::SERVICE_ID);
        let resolver = CapResolver::new(&folders.run, Some(own_socket.clone()), config);
        let resolver_listener = listen_uds(&own_socket).await?;
        let provider = resolver.provider()?;
        let token = shutdown.clone();
        tokio::spawn(async move { provider.start(resolver_listener, token).await });
        let runner = resolver.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = runner.run(token).await {
                warn!("test resolver stopped: {err}");
            }
        });

        Ok(Self {
            home,
            folders,
            issuer,
            ca_cert,
            resolver,
            shutdown,
        })
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    pub fn folders(&self) -> &AppFolders {
        &self.folders
    }

    pub fn run_dir(&self) -> &Path {
        &self.folders.run
    }

    pub fn resolver(&self) -> &CapResolver {
        &self.resolver
    }

    pub fn issuer(&self) -> &CertIssuer {
        &self.issuer
    }

    /// A fresh connection to the resolver socket.
    pub async fn resolver_client(&self) -> HubResult<ResolverClient> {
        ResolverClient::connect(&self.folders.socket_path(hiveot_resolver::SERVICE_ID), DIAL_TIMEOUT).await
    }

    /// Start an echo service in the run folder.
    pub async fn start_echo(&self, service_id: &str, roles: &[AuthType]) -> HubResult<EchoService> {
        EchoService::start(self.run_dir(), service_id, roles).await
    }

    /// Client certificate for `client_id` with a freshly generated key.
    pub fn client_cert(&self, client_id: &str, role: CertRole) -> HubResult<TlsCert> {
        let key = KeyPair::generate().map_err(|e| HubError::internal(format!("generate key: {e}")))?;
        let issued = match role {
            CertRole::IoTDevice => self.issuer.create_device_cert(client_id, &key.public_key_pem(), 1)?,
            CertRole::User => self.issuer.create_user_cert(client_id, &key.public_key_pem(), 1)?,
            CertRole::Service => self.issuer.create_service_cert(client_id, &key.public_key_pem(), &[], 1)?,
        };
        TlsCert::from_pem(&issued.cert_pem, &key.serialize_pem())
    }

    /// Dial options trusting the hub CA.
    pub fn dial_options(&self, client_cert: Option<TlsCert>) -> DialOptions {
        let opts = DialOptions::new().with_ca_cert(self.ca_cert.clone()).with_timeout(DIAL_TIMEOUT);
        match client_cert {
            Some(cert) => opts.with_client_cert(cert),
            None => opts,
        }
    }

    /// Start a gateway with TLS and WSS listeners on ephemeral ports.
    pub async fn start_gateway(&self) -> HubResult<TestGateway> {
        let key = KeyPair::generate().map_err(|e| HubError::internal(format!("generate key: {e}")))?;
        let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
        let issued = self
            .issuer
            .create_service_cert(hiveot_gateway::SERVICE_ID, &key.public_key_pem(), &names, 1)?;
        let tls = server_config(&TlsCert::from_pem(&issued.cert_pem, &key.serialize_pem())?, &self.ca_cert)?;

        let store = MemoryCredentialStore::new();
        store.add_user(TEST_USER, TEST_USER_PASSWORD)?;
        let dialer = UdsResolverDialer::new(self.folders.socket_path(hiveot_resolver::SERVICE_ID), DIAL_TIMEOUT);
        let service = GatewayService::new(
            Arc::new(SessionAuth::generate("test-hub")?),
            Arc::new(store),
            Arc::new(dialer),
        );

        let tcp = listen_tcp("127.0.0.1:0").await?;
        let url = format!("tcp://{}", tcp.socket_addr()?);
        let listener = wrap_tls(tcp, Arc::clone(&tls))?;
        let gateway = service.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move { gateway.serve(listener, token).await });

        let ws = wrap_wss(listen_tcp("127.0.0.1:0").await?, "/ws", Some(tls))?;
        let wss_url = ws.url();
        let gateway = service.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move { gateway.serve(ws, token).await });

        Ok(TestGateway { url, wss_url, service })
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.resolver.close();
    }
}
