//! Client dialers.
//!
//! Accepted URLs:
//!
//! - `unix:///path/to/service.socket`
//! - `tcp://host:port`, TLS when a CA certificate is given
//! - `ws://host:port/path`
//! - `wss://host:port/path`

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hiveot_kernel::{HubError, HubResult};
use hiveot_rpc::FrameTransport;
use rustls_pki_types::{CertificateDer, ServerName};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::peer::verify_signed_by;
use super::tls::{client_config, TlsCert};
use super::ws::client_ws_transport;
use super::DEFAULT_DIAL_TIMEOUT;

/// Parsed dial URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialTarget {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
    Ws { host: String, port: u16, path: String, secure: bool },
}

impl FromStr for DialTarget {
    type Err = HubError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| HubError::invalid_input(format!("'{url}' has no scheme")))?;
        match scheme {
            "unix" => {
                if rest.is_empty() {
                    return Err(HubError::invalid_input("unix URL without a path"));
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            "tcp" => {
                let (host, port) = split_host_port(rest)?;
                Ok(Self::Tcp { host, port })
            }
            "ws" | "wss" => {
                let (authority, path) = match rest.find('/') {
                    Some(idx) => (&rest[..idx], &rest[idx..]),
                    None => (rest, "/"),
                };
                let (host, port) = split_host_port(authority)?;
                Ok(Self::Ws {
                    host,
                    port,
                    path: path.to_string(),
                    secure: scheme == "wss",
                })
            }
            other => Err(HubError::invalid_input(format!("unsupported scheme '{other}'"))),
        }
    }
}

fn split_host_port(authority: &str) -> HubResult<(String, u16)> {
    let (host, port) = authority
        .rsplit_once(':')
        .ok_or_else(|| HubError::invalid_input(format!("'{authority}' has no port")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| HubError::invalid_input(format!("invalid port in '{authority}'")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(HubError::invalid_input(format!("'{authority}' has no host")));
    }
    Ok((host.to_string(), port))
}

/// TLS material and limits for [`dial`].
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub ca_cert: Option<CertificateDer<'static>>,
    pub client_cert: Option<TlsCert>,
    pub timeout: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            ca_cert: None,
            client_cert: None,
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl DialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, ca_cert: CertificateDer<'static>) -> Self {
        self.ca_cert = Some(ca_cert);
        self
    }

    pub fn with_client_cert(mut self, client_cert: TlsCert) -> Self {
        self.client_cert = Some(client_cert);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Open a frame transport to `url`.
pub async fn dial(url: &str, opts: &DialOptions) -> HubResult<FrameTransport> {
    let target: DialTarget = url.parse()?;
    debug!("dialing {url}");
    tokio::time::timeout(opts.timeout, dial_target(&target, url, opts))
        .await
        .map_err(|_| HubError::transport(format!("dial {url} timed out after {:?}", opts.timeout)))?
}

async fn dial_target(target: &DialTarget, url: &str, opts: &DialOptions) -> HubResult<FrameTransport> {
    match target {
        DialTarget::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| HubError::transport(format!("dial {url}: {e}")))?;
            Ok(FrameTransport::from_io(stream))
        }
        DialTarget::Tcp { host, port } => {
            let tcp = connect_tcp(host, *port).await?;
            if opts.ca_cert.is_some() {
                Ok(FrameTransport::from_io(connect_tls(tcp, host, opts).await?))
            } else {
                Ok(FrameTransport::from_io(tcp))
            }
        }
        DialTarget::Ws {
            host,
            port,
            secure,
            ..
        } => {
            let tcp = connect_tcp(host, *port).await?;
            if *secure {
                let tls = connect_tls(tcp, host, opts).await?;
                client_ws_transport(url, tls).await
            } else {
                client_ws_transport(url, tcp).await
            }
        }
    }
}

async fn connect_tcp(host: &str, port: u16) -> HubResult<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|e| HubError::transport(format!("connect {host}:{port}: {e}")))
}

async fn connect_tls(tcp: TcpStream, host: &str, opts: &DialOptions) -> HubResult<TlsStream<TcpStream>> {
    let ca_cert = opts
        .ca_cert
        .as_ref()
        .ok_or_else(|| HubError::invalid_input("a CA certificate is required for TLS"))?;
    if let Some(client_cert) = &opts.client_cert {
        verify_signed_by(client_cert.leaf().as_ref(), ca_cert.as_ref())?;
    }
    let config = client_config(ca_cert, opts.client_cert.as_ref())?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| HubError::invalid_input(format!("invalid server name '{host}': {e}")))?;
    TlsConnector::from(config)
        .connect(server_name, tcp)
        .await
        .map_err(|e| HubError::transport(format!("TLS handshake with {host}: {e}")))
}
