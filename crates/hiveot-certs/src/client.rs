//! Typed clients of the certs service.
//!
//! [`CertsClient`] wraps any client that reaches the certs root capability: a
//! direct connection to `certs.socket`, the resolver or a gateway session.

use hiveot_kernel::HubResult;
use hiveot_rpc::Client;

use crate::api::*;
use crate::issuer::IssuedCert;

#[derive(Debug, Clone)]
pub struct CertsClient {
    client: Client,
}

impl CertsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn cap_device_certs(&self) -> HubResult<DeviceCertsClient> {
        let client = self.client.invoke_cap(&CAP_DEVICE_CERTS, &()).await?;
        Ok(DeviceCertsClient { client })
    }

    pub async fn cap_service_certs(&self) -> HubResult<ServiceCertsClient> {
        let client = self.client.invoke_cap(&CAP_SERVICE_CERTS, &()).await?;
        Ok(ServiceCertsClient { client })
    }

    pub async fn cap_user_certs(&self) -> HubResult<UserCertsClient> {
        let client = self.client.invoke_cap(&CAP_USER_CERTS, &()).await?;
        Ok(UserCertsClient { client })
    }

    pub async fn cap_verify_certs(&self) -> HubResult<VerifyCertsClient> {
        let client = self.client.invoke_cap(&CAP_VERIFY_CERTS, &()).await?;
        Ok(VerifyCertsClient { client })
    }
}

#[derive(Debug, Clone)]
pub struct DeviceCertsClient {
    client: Client,
}

impl DeviceCertsClient {
    pub async fn create_device_cert(
        &self,
        device_id: &str,
        pub_key_pem: &str,
        validity_days: u32,
    ) -> HubResult<IssuedCert> {
        let args = CreateDeviceCertArgs {
            device_id: device_id.to_string(),
            pub_key_pem: pub_key_pem.to_string(),
            validity_days,
        };
        self.client.invoke(&CREATE_DEVICE_CERT, &args).await
    }
}

#[derive(Debug, Clone)]
pub struct ServiceCertsClient {
    client: Client,
}

impl ServiceCertsClient {
    pub async fn create_service_cert(
        &self,
        service_id: &str,
        pub_key_pem: &str,
        names: &[String],
        validity_days: u32,
    ) -> HubResult<IssuedCert> {
        let args = CreateServiceCertArgs {
            service_id: service_id.to_string(),
            pub_key_pem: pub_key_pem.to_string(),
            names: names.to_vec(),
            validity_days,
        };
        self.client.invoke(&CREATE_SERVICE_CERT, &args).await
    }
}

#[derive(Debug, Clone)]
pub struct UserCertsClient {
    client: Client,
}

impl UserCertsClient {
    pub async fn create_user_cert(
        &self,
        user_id: &str,
        pub_key_pem: &str,
        validity_days: u32,
    ) -> HubResult<IssuedCert> {
        let args = CreateUserCertArgs {
            user_id: user_id.to_string(),
            pub_key_pem: pub_key_pem.to_string(),
            validity_days,
        };
        self.client.invoke(&CREATE_USER_CERT, &args).await
    }
}

#[derive(Debug, Clone)]
pub struct VerifyCertsClient {
    client: Client,
}

impl VerifyCertsClient {
    pub async fn verify_cert(&self, client_id: &str, cert_pem: &str) -> HubResult<()> {
        let args = VerifyCertArgs {
            client_id: client_id.to_string(),
            cert_pem: cert_pem.to_string(),
        };
        self.client.invoke(&VERIFY_CERT, &args).await
    }
}
