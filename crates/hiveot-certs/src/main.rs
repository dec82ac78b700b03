//! `certs` service binary.
//!
//! Loads the hub CA from the certs folder and serves the certificate
//! capabilities on `<run>/certs.socket`. A missing or broken CA aborts startup.

use anyhow::Context;
use clap::Parser;
use hiveot_certs::{CertIssuer, CertsConfig, CertsService, HubCa, SERVICE_ID};
use hiveot_runtime::{ServiceArgs, ServiceShell};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "certs", version, about = "HiveOT certificate service")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shell = ServiceShell::new(SERVICE_ID, cli.service);
    shell.init_logging();

    let config: CertsConfig = shell.load_config()?;
    let ca = match HubCa::load(shell.folders()) {
        Ok(ca) => ca,
        Err(err) => {
            error!("{err}");
            return Err(err).context("the certs service requires a hub CA; create one with 'hubcli crca'");
        }
    };
    let issuer = CertIssuer::new(ca).with_service_validity_days(config.service_cert_validity_days);
    let provider = CertsService::new(issuer).provider()?;

    shell.exit_on_signal(|| info!("certs service stopping"));
    shell.serve(&provider).await?;
    Ok(())
}
