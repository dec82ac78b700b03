//! Certificate commands: `crca`, `lca`, `cruc`, `crdc`, `crsc` and `lc`.
//!
//! These work on the certs folder directly with the local CA; the certs
//! service does not need to run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use hiveot_certs::{write_private_key, CertIssuer, HubCa, IssuedCert};
use hiveot_kernel::folders::CA_CERT_FILE;
use hiveot_kernel::{AppFolders, CertRole};
use hiveot_runtime::transport::{cert_summary_pem, CertSummary};
use rcgen::KeyPair;
use tracing::info;

use crate::cli::KeyArgs;

/// Create and save a new CA. An existing CA is kept unless `force` is set.
pub fn create_ca(folders: &AppFolders, days: u32, force: bool) -> anyhow::Result<CertSummary> {
    if folders.ca_cert_path().exists() && !force {
        bail!(
            "a CA already exists at {}; use --force to replace it",
            folders.ca_cert_path().display()
        );
    }
    let ca = HubCa::create(days)?;
    ca.save(folders)?;
    Ok(cert_summary_pem(ca.cert_pem())?)
}

pub fn show_ca(folders: &AppFolders) -> anyhow::Result<CertSummary> {
    let ca = HubCa::load(folders).context("cannot load the hub CA")?;
    Ok(cert_summary_pem(ca.cert_pem())?)
}

/// Files written by a certificate command.
#[derive(Debug)]
pub struct CreatedCert {
    pub cert_path: PathBuf,
    /// Set when a key pair was generated.
    pub key_path: Option<PathBuf>,
    pub summary: CertSummary,
}

/// Issue a certificate with the local CA and store it as `<id>Cert.pem`.
pub fn create_cert(
    folders: &AppFolders,
    role: CertRole,
    id: &str,
    names: &[String],
    key: &KeyArgs,
) -> anyhow::Result<CreatedCert> {
    let issuer = CertIssuer::new(HubCa::load(folders).context("cannot load the hub CA")?);
    let (pub_key_pem, generated) = match &key.pubkey {
        Some(path) => {
            let pem = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            (pem, None)
        }
        None => {
            let pair = KeyPair::generate()?;
            (pair.public_key_pem(), Some(pair))
        }
    };

    let issued: IssuedCert = match role {
        CertRole::User => issuer.create_user_cert(id, &pub_key_pem, key.days)?,
        CertRole::IoTDevice => issuer.create_device_cert(id, &pub_key_pem, key.days)?,
        CertRole::Service => issuer.create_service_cert(id, &pub_key_pem, names, key.days)?,
    };

    let cert_path = folders.cert_path(id);
    std::fs::create_dir_all(&folders.certs)?;
    std::fs::write(&cert_path, &issued.cert_pem)?;
    let key_path = match generated {
        Some(pair) => {
            let path = folders.key_path(id);
            write_private_key(&path, &pair.serialize_pem())?;
            Some(path)
        }
        None => None,
    };
    info!("wrote {}", cert_path.display());
    Ok(CreatedCert {
        cert_path,
        key_path,
        summary: cert_summary_pem(&issued.cert_pem)?,
    })
}

/// One certificate file in the certs folder.
#[derive(Debug)]
pub struct CertEntry {
    pub file: String,
    pub summary: CertSummary,
}

/// Certificates in the certs folder, CA first, then by file name. Key files
/// and unreadable files are skipped.
pub fn list_certs(folders: &AppFolders) -> anyhow::Result<Vec<CertEntry>> {
    let entries = match std::fs::read_dir(&folders.certs) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", folders.certs.display())),
    };
    let mut certs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_cert_file(&path) {
            continue;
        }
        let Ok(pem) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(summary) = cert_summary_pem(&pem) else {
            continue;
        };
        let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        certs.push(CertEntry { file, summary });
    }
    certs.sort_by(|a, b| (a.file != CA_CERT_FILE, &a.file).cmp(&(b.file != CA_CERT_FILE, &b.file)));
    Ok(certs)
}

fn is_cert_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".pem") && !name.ends_with("Key.pem")
}
