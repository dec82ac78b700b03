//! `resolver` service binary.
//!
//! Serves the capability inventory of the run directory on
//! `<run>/resolver.socket`.

use clap::Parser;
use hiveot_resolver::{CapResolver, ResolverConfig, SERVICE_ID};
use hiveot_runtime::{ServiceArgs, ServiceShell};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "resolver", version, about = "HiveOT capability resolver")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shell = ServiceShell::new(SERVICE_ID, cli.service);
    shell.init_logging();

    let config: ResolverConfig = shell.load_config()?;
    let socket_dir = config.socket_dir.clone().unwrap_or_else(|| shell.folders().run.clone());
    let resolver = CapResolver::new(socket_dir, Some(shell.socket_path()), config);
    let provider = resolver.provider()?;

    let runner = resolver.clone();
    let shutdown = shell.shutdown_token();
    let scanner = tokio::spawn(async move {
        if let Err(err) = runner.run(shutdown).await {
            warn!("resolver scan loop ended: {err}");
        }
    });

    let releaser = resolver.clone();
    shell.exit_on_signal(move || {
        releaser.close();
        info!("resolver stopping");
    });
    shell.serve(&provider).await?;
    scanner.await?;
    Ok(())
}
