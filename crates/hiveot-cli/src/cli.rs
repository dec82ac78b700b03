//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// HiveOT hub management
#[derive(Parser)]
#[command(name = "hubcli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Hub home directory. Defaults to two levels above the binary.
    #[arg(long, global = true, env = "HIVEOT_HOME")]
    pub home: Option<PathBuf>,

    /// Use the system-wide folder layout
    #[arg(long = "useSystem", global = true)]
    pub use_system: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the hub CA certificate and key
    Crca {
        /// Validity in days
        #[arg(long, default_value_t = 365)]
        days: u32,

        /// Replace an existing CA
        #[arg(long)]
        force: bool,
    },

    /// Show the hub CA
    Lca,

    /// Create a user certificate
    Cruc {
        /// User ID, the certificate common name
        id: String,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Create an IoT device certificate
    Crdc {
        /// Device ID, the certificate common name
        id: String,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Create a service certificate
    Crsc {
        /// Service ID, the certificate common name
        id: String,

        /// DNS names and IP addresses of the service
        #[arg(long, value_delimiter = ',')]
        names: Vec<String>,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// List the certificates in the certs folder
    Lc,

    /// Print the argon2id hash of a password for the gateway `users` list
    Hashpw {
        password: String,
    },

    /// Gateway commands
    #[command(subcommand)]
    Gw(GatewayCommands),
}

/// Public key and validity of a new certificate
#[derive(clap::Args)]
pub struct KeyArgs {
    /// PEM public key file. A key pair is generated when omitted.
    #[arg(long)]
    pub pubkey: Option<PathBuf>,

    /// Validity in days, 0 uses the role default
    #[arg(long, default_value_t = 0)]
    pub days: u32,
}

#[derive(Subcommand)]
pub enum GatewayCommands {
    /// List the capabilities visible through the gateway
    List {
        /// Gateway URL
        #[arg(long, default_value = "tcp://127.0.0.1:9883")]
        url: String,

        /// Client certificate ID, loaded from `<certs>/<ID>Cert.pem` when present
        #[arg(long, default_value = "hubcli")]
        client: String,

        /// Connect without TLS
        #[arg(long = "noTLS")]
        no_tls: bool,
    },
}
