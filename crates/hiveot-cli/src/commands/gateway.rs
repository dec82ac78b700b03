//! `gw list`: capabilities visible to the CLI's role on the gateway.

use anyhow::Context;
use hiveot_gateway::{ClientInfo, GatewayClient};
use hiveot_kernel::{AppFolders, CapabilityInfo};
use hiveot_runtime::transport::{load_ca_cert, DialOptions};
use hiveot_runtime::TlsCert;
use tracing::debug;

/// Dial options for the gateway. The hub CA is required for TLS; the client
/// certificate is optional and sets the session role.
pub fn dial_options(folders: &AppFolders, client_id: &str, no_tls: bool) -> anyhow::Result<DialOptions> {
    let mut opts = DialOptions::new();
    if no_tls {
        return Ok(opts);
    }
    let ca_path = folders.ca_cert_path();
    let ca_pem = std::fs::read_to_string(&ca_path).with_context(|| format!("reading {}", ca_path.display()))?;
    opts = opts.with_ca_cert(load_ca_cert(&ca_pem)?);

    let cert_path = folders.cert_path(client_id);
    if cert_path.exists() {
        let cert = TlsCert::load(&cert_path, &folders.key_path(client_id))?;
        opts = opts.with_client_cert(cert);
    } else {
        debug!("no client certificate at {}, connecting unauthenticated", cert_path.display());
    }
    Ok(opts)
}

pub async fn list_capabilities(url: &str, opts: &DialOptions) -> anyhow::Result<(ClientInfo, Vec<CapabilityInfo>)> {
    let gateway = GatewayClient::connect(url, opts)
        .await
        .with_context(|| format!("cannot connect to gateway at {url}"))?;
    let info = gateway.ping().await?;
    let caps = gateway.list_capabilities().await?;
    gateway.close();
    Ok((info, caps))
}
