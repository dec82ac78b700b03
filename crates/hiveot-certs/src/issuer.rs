//! Certificate issuance and verification against the hub CA.

use std::net::IpAddr;
use std::sync::Arc;

use hiveot_kernel::{CertRole, HubError, HubResult};
use hiveot_runtime::transport::peer::pem_to_der;
use hiveot_runtime::transport::{cert_summary_der, verify_signed_by};
use rcgen::{
    CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose, SanType, SerialNumber,
    SubjectPublicKeyInfo,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::ca::{hub_dn, random_serial, HubCa};

/// A newly issued certificate with the CA that signed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCert {
    pub cert_pem: String,
    pub ca_cert_pem: String,
}

/// Issues device, service and user certificates.
#[derive(Debug, Clone)]
pub struct CertIssuer {
    ca: Arc<HubCa>,
    service_validity_days: u32,
}

impl CertIssuer {
    pub fn new(ca: HubCa) -> Self {
        Self {
            ca: Arc::new(ca),
            service_validity_days: CertRole::Service.default_validity_days(),
        }
    }

    /// Override the default validity of service certificates.
    pub fn with_service_validity_days(mut self, days: u32) -> Self {
        if days > 0 {
            self.service_validity_days = days;
        }
        self
    }

    pub fn ca(&self) -> &HubCa {
        &self.ca
    }

    pub fn ca_cert_pem(&self) -> &str {
        self.ca.cert_pem()
    }

    pub fn create_device_cert(&self, device_id: &str, pub_key_pem: &str, validity_days: u32) -> HubResult<IssuedCert> {
        info!("creating device certificate for '{device_id}'");
        self.issue(device_id, CertRole::IoTDevice, pub_key_pem, &[], validity_days)
    }

    /// `names` holds DNS names and literal IP addresses for the SAN extension.
    pub fn create_service_cert(
        &self,
        service_id: &str,
        pub_key_pem: &str,
        names: &[String],
        validity_days: u32,
    ) -> HubResult<IssuedCert> {
        info!("creating service certificate for '{service_id}' names={names:?}");
        self.issue(service_id, CertRole::Service, pub_key_pem, names, validity_days)
    }

    pub fn create_user_cert(&self, user_id: &str, pub_key_pem: &str, validity_days: u32) -> HubResult<IssuedCert> {
        info!("creating user certificate for '{user_id}'");
        self.issue(user_id, CertRole::User, pub_key_pem, &[], validity_days)
    }

    /// Succeeds when `cert_pem` was signed by the hub CA, is currently valid and
    /// names `client_id` as its common name.
    pub fn verify_cert(&self, client_id: &str, cert_pem: &str) -> HubResult<()> {
        let der = pem_to_der(cert_pem)?;
        let summary = cert_summary_der(&der)?;
        if summary.common_name != client_id {
            return Err(HubError::unauthorized(format!(
                "client ID '{client_id}' doesn't match certificate name '{}'",
                summary.common_name
            )));
        }
        verify_signed_by(&der, self.ca.cert_der())?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if !summary.is_valid_at(now) {
            return Err(HubError::unauthorized(format!(
                "certificate of '{client_id}' is outside its validity period"
            )));
        }
        Ok(())
    }

    fn issue(
        &self,
        id: &str,
        role: CertRole,
        pub_key_pem: &str,
        names: &[String],
        validity_days: u32,
    ) -> HubResult<IssuedCert> {
        if id.trim().is_empty() {
            return Err(HubError::invalid_input(format!("missing {role} ID")));
        }
        let public_key = SubjectPublicKeyInfo::from_pem(pub_key_pem).map_err(|e| {
            warn!("rejecting public key of '{id}': {e}");
            HubError::invalid_input(format!("public key of '{id}' is not a valid PEM key: {e}"))
        })?;
        let validity_days = match (validity_days, role) {
            (0, CertRole::Service) => self.service_validity_days,
            (0, role) => role.default_validity_days(),
            (days, _) => days,
        };

        let now = OffsetDateTime::now_utc();
        let mut params = CertificateParams::default();
        params.distinguished_name = hub_dn(id, Some(role.ou()));
        params.serial_number = Some(SerialNumber::from(random_serial(self.ca.serial())));
        params.is_ca = IsCa::ExplicitNoCa;
        params.not_before = now - Duration::minutes(1);
        params.not_after = now + Duration::days(i64::from(validity_days));
        params.use_authority_key_identifier_extension = true;
        match role {
            CertRole::Service => {
                params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
                params.extended_key_usages =
                    vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];
                params.subject_alt_names = subject_alt_names(names)?;
            }
            CertRole::IoTDevice | CertRole::User => {
                params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
            }
        }

        let cert = params
            .signed_by(&public_key, self.ca.issuer(), self.ca.key())
            .map_err(|e| HubError::internal(format!("signing certificate for '{id}': {e}")))?;
        Ok(IssuedCert {
            cert_pem: cert.pem(),
            ca_cert_pem: self.ca.cert_pem().to_string(),
        })
    }
}

/// Literal IP addresses become IP SANs, everything else a DNS SAN.
fn subject_alt_names(names: &[String]) -> HubResult<Vec<SanType>> {
    names
        .iter()
        .map(|name| match name.parse::<IpAddr>() {
            Ok(ip) => Ok(SanType::IpAddress(ip)),
            Err(_) => name
                .as_str()
                .try_into()
                .map(SanType::DnsName)
                .map_err(|_| HubError::invalid_input(format!("'{name}' is not a valid DNS name"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiveot_runtime::transport::cert_summary_pem;
    use rcgen::KeyPair;

    fn issuer() -> CertIssuer {
        CertIssuer::new(HubCa::create(1).unwrap())
    }

    fn pub_key() -> String {
        KeyPair::generate().unwrap().public_key_pem()
    }

    #[test]
    fn service_cert_round_trip() {
        let issuer = issuer();
        let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
        let issued = issuer.create_service_cert("srv1", &pub_key(), &names, 30).unwrap();
        assert_eq!(issued.ca_cert_pem, issuer.ca_cert_pem());

        issuer.verify_cert("srv1", &issued.cert_pem).unwrap();
        assert!(issuer.verify_cert("other", &issued.cert_pem).is_err());

        let summary = cert_summary_pem(&issued.cert_pem).unwrap();
        assert_eq!(summary.role(), Some(CertRole::Service));
        let days = (summary.not_after - summary.not_before) / 86_400;
        assert_eq!(days, 30);
    }

    #[test]
    fn every_role_verifies_for_its_id_only() {
        let issuer = issuer();
        for (role, days) in [(CertRole::IoTDevice, 1), (CertRole::User, 3650), (CertRole::Service, 7)] {
            let id = format!("{}-client", role.ou().to_lowercase());
            let issued = match role {
                CertRole::IoTDevice => issuer.create_device_cert(&id, &pub_key(), days),
                CertRole::User => issuer.create_user_cert(&id, &pub_key(), days),
                CertRole::Service => issuer.create_service_cert(&id, &pub_key(), &[], days),
            }
            .unwrap();
            assert!(issuer.verify_cert(&id, &issued.cert_pem).is_ok(), "{role}");
            assert!(issuer.verify_cert("someone-else", &issued.cert_pem).is_err(), "{role}");
            assert_eq!(cert_summary_pem(&issued.cert_pem).unwrap().role(), Some(role));
        }
    }

    #[test]
    fn zero_validity_selects_role_default() {
        let issuer = issuer().with_service_validity_days(45);
        let device = issuer.create_device_cert("d1", &pub_key(), 0).unwrap();
        let summary = cert_summary_pem(&device.cert_pem).unwrap();
        assert_eq!((summary.not_after - summary.not_before) / 86_400, 30);

        let service = issuer.create_service_cert("s1", &pub_key(), &[], 0).unwrap();
        let summary = cert_summary_pem(&service.cert_pem).unwrap();
        assert_eq!((summary.not_after - summary.not_before) / 86_400, 45);
    }

    #[test]
    fn serial_differs_from_ca() {
        let issuer = issuer();
        let issued = issuer.create_user_cert("alice", &pub_key(), 1).unwrap();
        let summary = cert_summary_pem(&issued.cert_pem).unwrap();
        let ca = cert_summary_pem(issuer.ca_cert_pem()).unwrap();
        assert_ne!(summary.serial, ca.serial);
    }

    #[test]
    fn rejects_bad_input() {
        let issuer = issuer();
        assert!(matches!(
            issuer.create_device_cert("", &pub_key(), 1),
            Err(HubError::InvalidInput(_))
        ));
        assert!(matches!(
            issuer.create_device_cert("d1", "not a key", 1),
            Err(HubError::InvalidInput(_))
        ));
        assert!(matches!(
            issuer.verify_cert("d1", "not a cert"),
            Err(HubError::InvalidInput(_))
        ));
    }

    #[test]
    fn foreign_certificate_fails_verification() {
        let ours = issuer();
        let theirs = issuer();
        let issued = theirs.create_user_cert("alice", &pub_key(), 1).unwrap();
        assert!(matches!(
            ours.verify_cert("alice", &issued.cert_pem),
            Err(HubError::Unauthorized(_))
        ));
    }
}
