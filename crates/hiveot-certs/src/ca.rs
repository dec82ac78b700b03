//! The self-signed hub CA.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use hiveot_kernel::{AppFolders, HubError, HubResult};
use rand::Rng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
    SerialNumber,
};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

pub const CA_COMMON_NAME: &str = "Hub CA";
pub const CERT_ORG_NAME: &str = "HiveOT";
pub const CERT_COUNTRY: &str = "CA";
pub const CERT_PROVINCE: &str = "BC";
pub const CERT_LOCALITY: &str = "hiveot.local";

/// Default CA validity, in days.
pub const DEFAULT_CA_VALIDITY_DAYS: u32 = 365;

fn rcgen_err(context: &str) -> impl Fn(rcgen::Error) -> HubError + '_ {
    move |e| HubError::internal(format!("{context}: {e}"))
}

/// Subject shared by every certificate the hub issues.
pub(crate) fn hub_dn(common_name: &str, ou: Option<&str>) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, CERT_COUNTRY);
    dn.push(DnType::StateOrProvinceName, CERT_PROVINCE);
    dn.push(DnType::LocalityName, CERT_LOCALITY);
    dn.push(DnType::OrganizationName, CERT_ORG_NAME);
    if let Some(ou) = ou {
        dn.push(DnType::OrganizationalUnitName, ou);
    }
    dn.push(DnType::CommonName, common_name);
    dn
}

/// Random positive 128-bit serial that differs from `avoid`.
pub(crate) fn random_serial(avoid: &[u8]) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        bytes[0] = (bytes[0] & 0x7f) | 0x01;
        if bytes.as_slice() != avoid {
            return bytes.to_vec();
        }
    }
}

fn raw_serial(der: &[u8]) -> HubResult<Vec<u8>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| HubError::fatal(format!("malformed CA certificate: {e}")))?;
    Ok(cert.raw_serial().to_vec())
}

/// CA certificate and private key. The key never leaves this struct except
/// when the CA is saved to disk.
pub struct HubCa {
    cert_pem: String,
    cert_der: Vec<u8>,
    serial: Vec<u8>,
    // re-signed copy of the CA used as issuer by rcgen
    issuer: rcgen::Certificate,
    key: KeyPair,
}

impl std::fmt::Debug for HubCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubCa").field("serial", &self.serial).finish_non_exhaustive()
    }
}

impl HubCa {
    /// Generate a new CA with a P-256 key.
    pub fn create(validity_days: u32) -> HubResult<Self> {
        let validity_days = if validity_days == 0 { DEFAULT_CA_VALIDITY_DAYS } else { validity_days };
        let key = KeyPair::generate().map_err(rcgen_err("generate CA key"))?;
        let serial = random_serial(&[]);
        let now = OffsetDateTime::now_utc();

        let mut params = CertificateParams::default();
        params.distinguished_name = hub_dn(CA_COMMON_NAME, None);
        params.serial_number = Some(SerialNumber::from(serial.clone()));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = now - Duration::minutes(1);
        params.not_after = now + Duration::days(i64::from(validity_days));
        let cert = params.self_signed(&key).map_err(rcgen_err("self-sign CA"))?;
        info!("created hub CA valid for {validity_days} days");

        Ok(Self {
            cert_pem: cert.pem(),
            cert_der: cert.der().to_vec(),
            serial,
            issuer: cert,
            key,
        })
    }

    /// Rebuild the CA from its PEM files. Any problem is fatal.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> HubResult<Self> {
        let key = KeyPair::from_pem(key_pem).map_err(|e| HubError::fatal(format!("malformed CA key: {e}")))?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| HubError::fatal(format!("malformed CA certificate: {e}")))?;
        let cert_der = hiveot_runtime::transport::peer::pem_to_der(cert_pem)
            .map_err(|e| HubError::fatal(e.to_string()))?;

        let (_, parsed) = X509Certificate::from_der(&cert_der)
            .map_err(|e| HubError::fatal(format!("malformed CA certificate: {e}")))?;
        if parsed.public_key().raw != key.public_key_der().as_slice() {
            return Err(HubError::fatal("CA key does not match the CA certificate"));
        }
        if !parsed.is_ca() {
            return Err(HubError::fatal("CA certificate is not a CA"));
        }
        let serial = raw_serial(&cert_der)?;
        let issuer = params
            .self_signed(&key)
            .map_err(|e| HubError::fatal(format!("CA certificate: {e}")))?;
        Ok(Self {
            cert_pem: cert_pem.to_string(),
            cert_der,
            serial,
            issuer,
            key,
        })
    }

    /// Load `hubCA.pem` and `hubCA.key` from the certs folder.
    pub fn load(folders: &AppFolders) -> HubResult<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path)
                .map_err(|e| HubError::fatal(format!("CA file {}: {e}", path.display())))
        };
        let cert_pem = read(&folders.ca_cert_path())?;
        let key_pem = read(&folders.ca_key_path())?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Load the CA, creating and saving a new one when none exists.
    pub fn load_or_create(folders: &AppFolders, validity_days: u32) -> HubResult<Self> {
        if folders.ca_cert_path().exists() {
            return Self::load(folders);
        }
        warn!("no CA in {}, creating a new one", folders.certs.display());
        let ca = Self::create(validity_days)?;
        ca.save(folders)?;
        Ok(ca)
    }

    /// Write the CA certificate and its key (mode 0400) to the certs folder.
    pub fn save(&self, folders: &AppFolders) -> HubResult<()> {
        std::fs::create_dir_all(&folders.certs)?;
        std::fs::write(folders.ca_cert_path(), &self.cert_pem)?;
        write_private_key(&folders.ca_key_path(), &self.key.serialize_pem())?;
        info!("saved hub CA to {}", folders.certs.display());
        Ok(())
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    pub(crate) fn issuer(&self) -> &rcgen::Certificate {
        &self.issuer
    }

    pub(crate) fn key(&self) -> &KeyPair {
        &self.key
    }
}

/// Write a PEM private key readable only by its owner. An existing file is
/// replaced.
pub fn write_private_key(path: &Path, pem: &str) -> HubResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o400)
        .open(path)?;
    file.write_all(pem.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiveot_runtime::transport::cert_summary_pem;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn created_ca_is_self_signed_ca() {
        let ca = HubCa::create(1).unwrap();
        let summary = cert_summary_pem(ca.cert_pem()).unwrap();
        assert!(summary.is_ca);
        assert_eq!(summary.common_name, CA_COMMON_NAME);
        assert!(hiveot_runtime::transport::verify_signed_by(ca.cert_der(), ca.cert_der()).is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let folders = AppFolders::from_home(dir.path());
        let ca = HubCa::create(10).unwrap();
        ca.save(&folders).unwrap();

        let mode = std::fs::metadata(folders.ca_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);

        let loaded = HubCa::load(&folders).unwrap();
        assert_eq!(loaded.cert_pem(), ca.cert_pem());
        assert_eq!(loaded.serial(), ca.serial());

        // saving again replaces the read-only key file
        loaded.save(&folders).unwrap();
    }

    #[test]
    fn missing_or_mismatched_ca_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let folders = AppFolders::from_home(dir.path());
        assert!(matches!(HubCa::load(&folders), Err(HubError::Fatal(_))));

        let a = HubCa::create(1).unwrap();
        let b = HubCa::create(1).unwrap();
        let err = HubCa::from_pem(a.cert_pem(), &b.key().serialize_pem()).unwrap_err();
        assert!(matches!(err, HubError::Fatal(_)));
        assert!(matches!(HubCa::from_pem("garbage", "garbage"), Err(HubError::Fatal(_))));
    }

    #[test]
    fn load_or_create_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let folders = AppFolders::from_home(dir.path());
        let first = HubCa::load_or_create(&folders, 1).unwrap();
        let second = HubCa::load_or_create(&folders, 1).unwrap();
        assert_eq!(first.cert_pem(), second.cert_pem());
    }

    #[test]
    fn serials_avoid_the_given_value() {
        let avoid = random_serial(&[]);
        for _ in 0..32 {
            let serial = random_serial(&avoid);
            assert_ne!(serial, avoid);
            assert_eq!(serial.len(), 16);
            assert!(serial[0] & 0x80 == 0 && serial[0] != 0);
        }
    }
}
