//! `gateway` service binary.
//!
//! Serves client sessions on TLS (`port`) and WSS (`wss_port`). The server
//! certificate is renewed through the certs service when it is reachable,
//! otherwise the files of the last renewal are used.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hiveot_authn::{MemoryCredentialStore, SessionAuth, DEFAULT_ISSUER};
use hiveot_certs::{default_service_names, load_or_create_key, load_service_tls, renew_service_cert, CertsClient, ServiceTls};
use hiveot_gateway::{GatewayConfig, GatewayService, UdsResolverDialer, SERVICE_ID};
use hiveot_kernel::{AppFolders, HubError, HubResult};
use hiveot_resolver::ResolverClient;
use hiveot_runtime::transport::{listen_tcp, server_config, wrap_tls, wrap_wss};
use hiveot_runtime::{ServiceArgs, ServiceShell};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "HiveOT gateway")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shell = ServiceShell::new(SERVICE_ID, cli.service);
    shell.init_logging();

    let config: GatewayConfig = shell.load_config()?;
    let resolver_socket = config
        .resolver_socket
        .clone()
        .unwrap_or_else(|| shell.folders().socket_path(hiveot_resolver::SERVICE_ID));

    let auth = SessionAuth::generate(DEFAULT_ISSUER)?
        .with_validity(config.access_token_validity(), config.refresh_token_validity());
    let store = MemoryCredentialStore::from_entries(&config.users)?;
    if store.is_empty() {
        warn!("no users configured, Login will reject every client");
    }
    let dialer = UdsResolverDialer::new(&resolver_socket, config.dial_timeout());
    let gateway = GatewayService::new(Arc::new(auth), Arc::new(store), Arc::new(dialer));

    let tls = if config.no_tls {
        warn!("TLS disabled, clients are served in plain text");
        None
    } else {
        let material = match obtain_server_cert(shell.folders(), &resolver_socket, &config).await {
            Ok(material) => material,
            Err(err) => {
                error!("{err}");
                return Err(err).context("the gateway needs a server certificate");
            }
        };
        Some(server_config(&material.cert, &material.ca_cert)?)
    };

    let shutdown = shell.shutdown_token();
    let mut tasks = JoinSet::new();

    let tcp = listen_tcp(&config.listen_addr()).await?;
    match &tls {
        Some(tls) => {
            let listener = wrap_tls(tcp, Arc::clone(tls))?;
            let gateway = gateway.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { gateway.serve(listener, shutdown).await });
        }
        None => {
            let gateway = gateway.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move { gateway.serve(tcp, shutdown).await });
        }
    }
    if let Some(addr) = config.wss_listen_addr() {
        let listener = wrap_wss(listen_tcp(&addr).await?, &config.wss_path, tls.clone())?;
        info!("websocket sessions on {}", listener.url());
        let gateway = gateway.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move { gateway.serve(listener, shutdown).await });
    }

    let releaser = gateway.clone();
    shell.exit_on_signal(move || {
        releaser.close_all();
        info!("gateway stopping");
    });

    while let Some(result) = tasks.join_next().await {
        result??;
    }
    gateway.close_all();
    Ok(())
}

/// Renew the server certificate through the resolver, falling back to the
/// certificate files on disk. Having neither is fatal.
async fn obtain_server_cert(
    folders: &AppFolders,
    resolver_socket: &std::path::Path,
    config: &GatewayConfig,
) -> HubResult<ServiceTls> {
    let renewed = async {
        let resolver = ResolverClient::connect(resolver_socket, config.dial_timeout()).await?;
        let certs = CertsClient::new(resolver.client().clone());
        let key = load_or_create_key(folders, SERVICE_ID)?;
        renew_service_cert(&certs, folders, SERVICE_ID, &key, &default_service_names()).await
    }
    .await;
    match renewed {
        Ok(tls) => Ok(tls),
        Err(err) => {
            warn!("certificate renewal failed, using existing files: {err}");
            load_service_tls(folders, SERVICE_ID)
                .map_err(|e| HubError::fatal(format!("no server certificate available: {e}")))
        }
    }
}
