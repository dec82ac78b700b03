//! Certificate inspection and peer identity.
//!
//! The TLS layer has already checked the client chain against the hub CA by the
//! time [`peer_identity`] runs; here the subject is only mapped to a client id
//! and a role.

use hiveot_kernel::{AuthType, CertRole, HubError, HubResult};
use rustls_pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;

/// Identity of a connected peer, taken from its certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Certificate common name.
    pub client_id: String,
    pub role: CertRole,
    pub cert_der: Vec<u8>,
}

impl PeerIdentity {
    pub fn auth_type(&self) -> AuthType {
        self.role.auth_type()
    }
}

/// The fields of a certificate the hub cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    pub common_name: String,
    pub organizational_unit: Option<String>,
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    /// Unix timestamps, seconds.
    pub not_before: i64,
    pub not_after: i64,
    pub is_ca: bool,
}

impl CertSummary {
    pub fn role(&self) -> Option<CertRole> {
        self.organizational_unit.as_deref().and_then(CertRole::from_ou)
    }

    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }
}

fn parse_der(der: &[u8]) -> HubResult<X509Certificate<'_>> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| HubError::invalid_input(format!("malformed certificate: {e}")))
}

/// Decode the first CERTIFICATE block of a PEM string.
pub fn pem_to_der(pem: &str) -> HubResult<Vec<u8>> {
    let (_, block) = parse_x509_pem(pem.as_bytes())
        .map_err(|e| HubError::invalid_input(format!("not a PEM certificate: {e}")))?;
    if block.label != "CERTIFICATE" {
        return Err(HubError::invalid_input(format!(
            "expected a CERTIFICATE block, found '{}'",
            block.label
        )));
    }
    Ok(block.contents)
}

pub fn cert_summary_der(der: &[u8]) -> HubResult<CertSummary> {
    let cert = parse_der(der)?;
    let subject = cert.subject();
    let common_name = subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();
    let organizational_unit = subject
        .iter_organizational_unit()
        .next()
        .and_then(|ou| ou.as_str().ok())
        .map(str::to_string);
    let validity = cert.validity();
    Ok(CertSummary {
        common_name,
        organizational_unit,
        subject: subject.to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: validity.not_before.timestamp(),
        not_after: validity.not_after.timestamp(),
        is_ca: cert.is_ca(),
    })
}

pub fn cert_summary_pem(pem: &str) -> HubResult<CertSummary> {
    cert_summary_der(&pem_to_der(pem)?)
}

/// Check that `cert_der` carries a valid signature by the key of `ca_der`.
pub fn verify_signed_by(cert_der: &[u8], ca_der: &[u8]) -> HubResult<()> {
    let cert = parse_der(cert_der)?;
    let ca = parse_der(ca_der)?;
    cert.verify_signature(Some(ca.public_key()))
        .map_err(|e| HubError::unauthorized(format!("certificate is not signed by the hub CA: {e}")))
}

/// Map the peer's leaf certificate to an identity.
///
/// No certificate yields `Ok(None)`. A certificate whose OU is not a known role
/// is rejected.
pub fn peer_identity(certs: Option<&[CertificateDer<'_>]>) -> HubResult<Option<PeerIdentity>> {
    let Some(leaf) = certs.and_then(|chain| chain.first()) else {
        return Ok(None);
    };
    let summary = cert_summary_der(leaf.as_ref())?;
    let ou = summary.organizational_unit.clone().unwrap_or_default();
    let role = CertRole::from_ou(&ou).ok_or_else(|| {
        HubError::forbidden(format!(
            "certificate of '{}' has unknown OU '{ou}'",
            summary.common_name
        ))
    })?;
    if summary.common_name.is_empty() {
        return Err(HubError::forbidden("certificate has no common name"));
    }
    Ok(Some(PeerIdentity {
        client_id: summary.common_name,
        role,
        cert_der: leaf.as_ref().to_vec(),
    }))
}
