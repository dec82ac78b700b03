//! hubcli - HiveOT hub management
//!
//! Certificate commands work on the local certs folder. `gw list` connects to
//! the gateway.

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands, GatewayCommands};
use colored::Colorize;
use hiveot_kernel::logging::init_logging;
use hiveot_kernel::{AppFolders, CertRole};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging("hubcli", if cli.verbose { "debug" } else { "warn" }, false);

    let folders = AppFolders::new(cli.home.as_deref(), cli.use_system);
    let rt = tokio::runtime::Runtime::new()?;
    if let Err(err) = rt.block_on(run_command(cli.command, &folders)) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command(command: Commands, folders: &AppFolders) -> anyhow::Result<()> {
    match command {
        Commands::Crca { days, force } => {
            let ca = commands::certs::create_ca(folders, days, force)?;
            println!("{} {}", "Created hub CA in".green(), folders.certs.display());
            println!("{}", output::cert_details(&ca));
        }

        Commands::Lca => {
            let ca = commands::certs::show_ca(folders)?;
            println!("{}", output::cert_details(&ca));
        }

        Commands::Cruc { id, key } => {
            print_created(commands::certs::create_cert(folders, CertRole::User, &id, &[], &key)?);
        }

        Commands::Crdc { id, key } => {
            print_created(commands::certs::create_cert(folders, CertRole::IoTDevice, &id, &[], &key)?);
        }

        Commands::Crsc { id, names, key } => {
            print_created(commands::certs::create_cert(folders, CertRole::Service, &id, &names, &key)?);
        }

        Commands::Lc => {
            let certs = commands::certs::list_certs(folders)?;
            if certs.is_empty() {
                println!("No certificates in {}", folders.certs.display());
            } else {
                println!("{}", output::cert_table(&certs));
            }
        }

        Commands::Hashpw { password } => {
            println!("{}", hiveot_authn::hash_password(&password)?);
        }

        Commands::Gw(GatewayCommands::List { url, client, no_tls }) => {
            let opts = commands::gateway::dial_options(folders, &client, no_tls)?;
            let (info, caps) = commands::gateway::list_capabilities(&url, &opts).await?;
            let who = if info.client_id.is_empty() { "anonymous".to_string() } else { info.client_id };
            println!(
                "{} capabilities available to {} ({})",
                caps.len().to_string().yellow(),
                who.cyan(),
                info.auth_type
            );
            if !caps.is_empty() {
                println!("{}", output::capability_table(&caps));
            }
        }
    }
    Ok(())
}

fn print_created(created: commands::certs::CreatedCert) {
    println!(
        "{} {} ({}, expires {})",
        "Created".green(),
        created.cert_path.display(),
        created.summary.organizational_unit.unwrap_or_default(),
        output::format_time(created.summary.not_after)
    );
    if let Some(key_path) = created.key_path {
        println!("{} {}", "Private key".green(), key_path.display());
    }
}
