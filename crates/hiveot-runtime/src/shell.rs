//! Service bootstrap shared by the hub binaries.

use std::path::PathBuf;

use clap::Args;
use hiveot_kernel::config::load_optional_config;
use hiveot_kernel::logging::init_logging;
use hiveot_kernel::{AppFolders, HubError, HubResult};
use rustls_pki_types::CertificateDer;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capprovider::CapProvider;
use crate::signal::exit_on_signal;
use crate::transport::{listen_uds, load_ca_cert, UdsListener};

/// Command line flags every service accepts.
#[derive(Debug, Clone, Default, Args)]
pub struct ServiceArgs {
    /// Hub home directory. Defaults to two levels above the binary.
    #[arg(long, env = "HIVEOT_HOME")]
    pub home: Option<PathBuf>,

    /// Use the system-wide folder layout.
    #[arg(long = "useSystem")]
    pub use_system: bool,

    /// Configuration file. Defaults to `<home>/config/<serviceID>.yaml`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set.
    #[arg(long = "loglevel", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long = "logjson")]
    pub log_json: bool,
}

/// Folders, config, logging and the service socket of one service process.
pub struct ServiceShell {
    service_id: String,
    args: ServiceArgs,
    folders: AppFolders,
    shutdown: CancellationToken,
}

impl ServiceShell {
    pub fn new(service_id: impl Into<String>, args: ServiceArgs) -> Self {
        let folders = AppFolders::new(args.home.as_deref(), args.use_system);
        Self::with_folders(service_id, args, folders)
    }

    pub fn with_folders(service_id: impl Into<String>, args: ServiceArgs, folders: AppFolders) -> Self {
        Self {
            service_id: service_id.into(),
            args,
            folders,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn folders(&self) -> &AppFolders {
        &self.folders
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn init_logging(&self) {
        init_logging(&self.service_id, &self.args.log_level, self.args.log_json);
    }

    pub fn config_path(&self) -> PathBuf {
        self.args
            .config
            .clone()
            .unwrap_or_else(|| self.folders.config_file(&self.service_id))
    }

    /// Load the service config, falling back to defaults when the file is absent.
    pub fn load_config<T: DeserializeOwned + Default>(&self) -> HubResult<T> {
        Ok(load_optional_config(&self.config_path())?)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.folders.socket_path(&self.service_id)
    }

    /// Hub CA certificate from the certs folder. Absence is fatal for any
    /// service that terminates TLS.
    pub fn ca_cert(&self) -> HubResult<CertificateDer<'static>> {
        let path = self.folders.ca_cert_path();
        let pem = std::fs::read_to_string(&path)
            .map_err(|e| HubError::fatal(format!("CA certificate {}: {e}", path.display())))?;
        load_ca_cert(&pem)
    }

    pub async fn listen(&self) -> HubResult<UdsListener> {
        listen_uds(&self.socket_path()).await
    }

    /// Install the SIGINT/SIGTERM handler; `release` runs before exit.
    pub fn exit_on_signal<F>(&self, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        exit_on_signal(self.shutdown.clone(), release);
    }

    /// Serve `provider` on the service socket until shutdown.
    pub async fn serve(&self, provider: &CapProvider) -> HubResult<()> {
        let listener = self.listen().await?;
        info!(
            "{} started with {} exported capabilities",
            self.service_id,
            provider.list_capabilities().len()
        );
        provider.start(listener, self.shutdown.clone()).await
    }
}
