//! Service certificate renewal.

use hiveot_kernel::{AppFolders, HubError, HubResult};
use hiveot_runtime::transport::{load_ca_cert, TlsCert};
use rcgen::KeyPair;
use rustls_pki_types::CertificateDer;
use tracing::{info, warn};

use crate::ca::write_private_key;
use crate::client::CertsClient;

/// Server certificate of a service plus the CA that signed it.
#[derive(Debug, Clone)]
pub struct ServiceTls {
    pub cert: TlsCert,
    pub ca_cert: CertificateDer<'static>,
}

/// Names used when the caller gives none.
pub fn default_service_names() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "localhost".to_string()]
}

/// Reuse `<id>Key.pem` when present, otherwise generate a new P-256 key.
pub fn load_or_create_key(folders: &AppFolders, service_id: &str) -> HubResult<KeyPair> {
    let path = folders.key_path(service_id);
    if let Ok(pem) = std::fs::read_to_string(&path) {
        match KeyPair::from_pem(&pem) {
            Ok(key) => return Ok(key),
            Err(e) => warn!("ignoring unreadable key {}: {e}", path.display()),
        }
    }
    KeyPair::generate().map_err(|e| HubError::internal(format!("generate key: {e}")))
}

/// Ask the certs service for a fresh server certificate and store it with its
/// key as `<id>Cert.pem` / `<id>Key.pem`.
pub async fn renew_service_cert(
    certs: &CertsClient,
    folders: &AppFolders,
    service_id: &str,
    key: &KeyPair,
    names: &[String],
) -> HubResult<ServiceTls> {
    let names = if names.is_empty() { default_service_names() } else { names.to_vec() };
    let issued = certs
        .cap_service_certs()
        .await?
        .create_service_cert(service_id, &key.public_key_pem(), &names, 0)
        .await?;

    let key_pem = key.serialize_pem();
    std::fs::create_dir_all(&folders.certs)?;
    std::fs::write(folders.cert_path(service_id), &issued.cert_pem)?;
    write_private_key(&folders.key_path(service_id), &key_pem)?;
    std::fs::write(folders.ca_cert_path(), &issued.ca_cert_pem)?;
    info!("renewed service certificate of '{service_id}'");

    Ok(ServiceTls {
        cert: TlsCert::from_pem(&issued.cert_pem, &key_pem)?,
        ca_cert: load_ca_cert(&issued.ca_cert_pem)?,
    })
}

/// Certificate files of a previous renewal.
pub fn load_service_tls(folders: &AppFolders, service_id: &str) -> HubResult<ServiceTls> {
    let cert = TlsCert::load(&folders.cert_path(service_id), &folders.key_path(service_id))?;
    let ca_pem = std::fs::read_to_string(folders.ca_cert_path())
        .map_err(|e| HubError::not_found(format!("{}: {e}", folders.ca_cert_path().display())))?;
    Ok(ServiceTls {
        cert,
        ca_cert: load_ca_cert(&ca_pem)?,
    })
}
