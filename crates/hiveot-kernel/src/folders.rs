//! Application folder layout.
//!
//! A hub installation is a home directory with `bin`, `config`, `certs`, `logs`,
//! `run` and `stores` below it. The home is derived from the location of the
//! running binary unless given explicitly. The system layout spreads the same
//! folders over the FHS locations.

use std::path::{Path, PathBuf};

/// File name of the CA certificate in the certs folder.
pub const CA_CERT_FILE: &str = "hubCA.pem";
/// File name of the CA private key in the certs folder.
pub const CA_KEY_FILE: &str = "hubCA.key";
/// Socket file extension in the run folder.
pub const SOCKET_EXTENSION: &str = "socket";

/// Resolved folders of a hub installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppFolders {
    pub home: PathBuf,
    pub bin: PathBuf,
    pub services: PathBuf,
    pub config: PathBuf,
    pub certs: PathBuf,
    pub logs: PathBuf,
    pub run: PathBuf,
    pub stores: PathBuf,
}

impl AppFolders {
    /// Resolve the folders.
    ///
    /// `home` overrides discovery from the binary location. `use_system` ignores
    /// both and returns the system layout.
    pub fn new(home: Option<&Path>, use_system: bool) -> Self {
        if use_system {
            return Self::system();
        }
        match home {
            Some(home) => Self::from_home(home),
            None => Self::from_home(&discover_home()),
        }
    }

    /// Layout below a single home directory.
    pub fn from_home(home: &Path) -> Self {
        let bin = home.join("bin");
        Self {
            home: home.to_path_buf(),
            services: bin.join("services"),
            bin,
            config: home.join("config"),
            certs: home.join("certs"),
            logs: home.join("logs"),
            run: home.join("run"),
            stores: home.join("stores"),
        }
    }

    /// Layout of a system-wide installation.
    pub fn system() -> Self {
        let home = PathBuf::from("/opt/hiveot");
        Self {
            bin: home.clone(),
            services: home.join("services"),
            home,
            config: PathBuf::from("/etc/hiveot/conf.d"),
            certs: PathBuf::from("/etc/hiveot/certs"),
            logs: PathBuf::from("/var/log/hiveot"),
            run: PathBuf::from("/run/hiveot"),
            stores: PathBuf::from("/var/lib/hiveot"),
        }
    }

    /// `<run>/<service_id>.socket`
    pub fn socket_path(&self, service_id: &str) -> PathBuf {
        self.run.join(format!("{service_id}.{SOCKET_EXTENSION}"))
    }

    /// `<config>/<service_id>.yaml`
    pub fn config_file(&self, service_id: &str) -> PathBuf {
        self.config.join(format!("{service_id}.yaml"))
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.certs.join(CA_CERT_FILE)
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.certs.join(CA_KEY_FILE)
    }

    /// `<certs>/<id>Cert.pem`
    pub fn cert_path(&self, id: &str) -> PathBuf {
        self.certs.join(format!("{id}Cert.pem"))
    }

    /// `<certs>/<id>Key.pem`
    pub fn key_path(&self, id: &str) -> PathBuf {
        self.certs.join(format!("{id}Key.pem"))
    }

    /// Service store folder `<stores>/<service_id>`.
    pub fn store_path(&self, service_id: &str) -> PathBuf {
        self.stores.join(service_id)
    }
}

/// Derive the home from the running binary: `<home>/bin/services/x` and
/// `<home>/bin/x` both resolve to `<home>`.
fn discover_home() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    home_from_bin_dir(&exe_dir)
}

fn home_from_bin_dir(dir: &Path) -> PathBuf {
    let parent = |p: &Path| p.parent().map(Path::to_path_buf).unwrap_or_else(|| p.to_path_buf());
    if dir.ends_with("services") {
        parent(&parent(dir))
    } else {
        parent(dir)
    }
}

/// Service id derived from a socket path: `run/certs.socket` → `certs`.
pub fn service_id_from_socket(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != SOCKET_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}
