//! RPC servers of the certs service.
//!
//! The root [`CertsService`] only hands out sub-capabilities. Each
//! sub-capability is its own server so a holder of one cannot reach the others.

use hiveot_kernel::{AuthType, HubError};
use hiveot_rpc::{Client, Payload, ServerBuilder};
use hiveot_runtime::CapProvider;
use serde::{Deserialize, Serialize};

use crate::api::*;
use crate::issuer::CertIssuer;

/// Tunables of the certs service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertsConfig {
    pub ca_validity_days: u32,
    /// 0 keeps the built-in default.
    pub service_cert_validity_days: u32,
}

impl Default for CertsConfig {
    fn default() -> Self {
        Self {
            ca_validity_days: crate::ca::DEFAULT_CA_VALIDITY_DAYS,
            service_cert_validity_days: 0,
        }
    }
}

pub struct DeviceCerts {
    issuer: CertIssuer,
}

impl DeviceCerts {
    pub fn new(issuer: CertIssuer) -> Self {
        Self { issuer }
    }

    pub fn into_client(self) -> Client {
        let issuer = self.issuer;
        Client::new(
            ServerBuilder::new("DeviceCerts")
                .typed(&CREATE_DEVICE_CERT, move |args: CreateDeviceCertArgs| {
                    let result = issuer.create_device_cert(&args.device_id, &args.pub_key_pem, args.validity_days);
                    async move { result }
                })
                .build(),
        )
    }
}

pub struct ServiceCerts {
    issuer: CertIssuer,
}

impl ServiceCerts {
    pub fn new(issuer: CertIssuer) -> Self {
        Self { issuer }
    }

    pub fn into_client(self) -> Client {
        let issuer = self.issuer;
        Client::new(
            ServerBuilder::new("ServiceCerts")
                .typed(&CREATE_SERVICE_CERT, move |args: CreateServiceCertArgs| {
                    let result = issuer.create_service_cert(
                        &args.service_id,
                        &args.pub_key_pem,
                        &args.names,
                        args.validity_days,
                    );
                    async move { result }
                })
                .build(),
        )
    }
}

pub struct UserCerts {
    issuer: CertIssuer,
}

impl UserCerts {
    pub fn new(issuer: CertIssuer) -> Self {
        Self { issuer }
    }

    pub fn into_client(self) -> Client {
        let issuer = self.issuer;
        Client::new(
            ServerBuilder::new("UserCerts")
                .typed(&CREATE_USER_CERT, move |args: CreateUserCertArgs| {
                    let result = issuer.create_user_cert(&args.user_id, &args.pub_key_pem, args.validity_days);
                    async move { result }
                })
                .build(),
        )
    }
}

pub struct VerifyCerts {
    issuer: CertIssuer,
}

impl VerifyCerts {
    pub fn new(issuer: CertIssuer) -> Self {
        Self { issuer }
    }

    pub fn into_client(self) -> Client {
        let issuer = self.issuer;
        Client::new(
            ServerBuilder::new("VerifyCerts")
                .typed(&VERIFY_CERT, move |args: VerifyCertArgs| {
                    let result = issuer.verify_cert(&args.client_id, &args.cert_pem);
                    async move { result }
                })
                .build(),
        )
    }
}

/// Root capability of the certs service.
pub struct CertsService {
    issuer: CertIssuer,
}

impl CertsService {
    pub fn new(issuer: CertIssuer) -> Self {
        Self { issuer }
    }

    pub fn issuer(&self) -> &CertIssuer {
        &self.issuer
    }

    pub fn server_builder(&self) -> ServerBuilder {
        let device = self.issuer.clone();
        let service = self.issuer.clone();
        let user = self.issuer.clone();
        let verify = self.issuer.clone();
        ServerBuilder::new(SERVICE_ID)
            .method(&CAP_DEVICE_CERTS, move |_| {
                let cap = DeviceCerts::new(device.clone()).into_client();
                async move { Payload::from_cap(cap) }
            })
            .method(&CAP_SERVICE_CERTS, move |_| {
                let cap = ServiceCerts::new(service.clone()).into_client();
                async move { Payload::from_cap(cap) }
            })
            .method(&CAP_USER_CERTS, move |_| {
                let cap = UserCerts::new(user.clone()).into_client();
                async move { Payload::from_cap(cap) }
            })
            .method(&CAP_VERIFY_CERTS, move |_| {
                let cap = VerifyCerts::new(verify.clone()).into_client();
                async move { Payload::from_cap(cap) }
            })
    }

    /// Capability provider with the service's exports applied.
    pub fn provider(&self) -> Result<CapProvider, HubError> {
        let provider = CapProvider::new(SERVICE_ID, self.server_builder());
        provider.export_capability(CAP_DEVICE_CERTS.method_name, [AuthType::Service])?;
        provider.export_capability(CAP_SERVICE_CERTS.method_name, [AuthType::Service])?;
        provider.export_capability(CAP_USER_CERTS.method_name, [AuthType::Service])?;
        provider.export_capability(
            CAP_VERIFY_CERTS.method_name,
            [AuthType::Service, AuthType::User, AuthType::IoTDevice],
        )?;
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::HubCa;
    use crate::client::CertsClient;
    use hiveot_runtime::LIST_CAPABILITIES;
    use hiveot_kernel::CapabilityInfo;
    use rcgen::KeyPair;

    fn service() -> CertsService {
        CertsService::new(CertIssuer::new(HubCa::create(1).unwrap()))
    }

    #[tokio::test]
    async fn exports_four_sub_capabilities() {
        let provider = service().provider().unwrap();
        let list: Vec<CapabilityInfo> = provider.client().invoke(&LIST_CAPABILITIES, &()).await.unwrap();
        let names: Vec<&str> = list.iter().map(|c| c.method_name.as_str()).collect();
        assert_eq!(names, ["CapDeviceCerts", "CapServiceCerts", "CapUserCerts", "CapVerifyCerts"]);
        let verify = list.iter().find(|c| c.method_name == "CapVerifyCerts").unwrap();
        assert!(verify.admits(AuthType::IoTDevice));
        assert!(!list[0].admits(AuthType::User));
    }

    #[tokio::test]
    async fn sub_capabilities_issue_and_verify() {
        let provider = service().provider().unwrap();
        let certs = CertsClient::new(provider.client());
        let key = KeyPair::generate().unwrap();

        let service_certs = certs.cap_service_certs().await.unwrap();
        let issued = service_certs
            .create_service_cert("srv1", &key.public_key_pem(), &["127.0.0.1".into(), "localhost".into()], 30)
            .await
            .unwrap();

        let verify = certs.cap_verify_certs().await.unwrap();
        verify.verify_cert("srv1", &issued.cert_pem).await.unwrap();
        let err = verify.verify_cert("other", &issued.cert_pem).await.unwrap_err();
        assert!(matches!(err, HubError::Unauthorized(_)));

        let device = certs.cap_device_certs().await.unwrap();
        let err = device.create_device_cert("", &key.public_key_pem(), 0).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));
    }
}
