//! Wire interface of the certs service.
//!
//! The root capability hands out four sub-capabilities, each with its own
//! interface id.

use hiveot_rpc::MethodDescriptor;
use serde::{Deserialize, Serialize};

/// Canonical service id and socket name.
pub const SERVICE_ID: &str = "certs";

pub const CERTS_INTERFACE_ID: u64 = 0x8f35_d6b0_1a2c_4e71;
pub const DEVICE_CERTS_INTERFACE_ID: u64 = 0x8f35_d6b0_1a2c_4e72;
pub const SERVICE_CERTS_INTERFACE_ID: u64 = 0x8f35_d6b0_1a2c_4e73;
pub const USER_CERTS_INTERFACE_ID: u64 = 0x8f35_d6b0_1a2c_4e74;
pub const VERIFY_CERTS_INTERFACE_ID: u64 = 0x8f35_d6b0_1a2c_4e75;

pub const CAP_DEVICE_CERTS: MethodDescriptor =
    MethodDescriptor::new(CERTS_INTERFACE_ID, 0, "CertsService", "CapDeviceCerts");
pub const CAP_SERVICE_CERTS: MethodDescriptor =
    MethodDescriptor::new(CERTS_INTERFACE_ID, 1, "CertsService", "CapServiceCerts");
pub const CAP_USER_CERTS: MethodDescriptor =
    MethodDescriptor::new(CERTS_INTERFACE_ID, 2, "CertsService", "CapUserCerts");
pub const CAP_VERIFY_CERTS: MethodDescriptor =
    MethodDescriptor::new(CERTS_INTERFACE_ID, 3, "CertsService", "CapVerifyCerts");

pub const CREATE_DEVICE_CERT: MethodDescriptor =
    MethodDescriptor::new(DEVICE_CERTS_INTERFACE_ID, 0, "DeviceCerts", "CreateDeviceCert");
pub const CREATE_SERVICE_CERT: MethodDescriptor =
    MethodDescriptor::new(SERVICE_CERTS_INTERFACE_ID, 0, "ServiceCerts", "CreateServiceCert");
pub const CREATE_USER_CERT: MethodDescriptor =
    MethodDescriptor::new(USER_CERTS_INTERFACE_ID, 0, "UserCerts", "CreateUserCert");
pub const VERIFY_CERT: MethodDescriptor =
    MethodDescriptor::new(VERIFY_CERTS_INTERFACE_ID, 0, "VerifyCerts", "VerifyCert");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceCertArgs {
    pub device_id: String,
    pub pub_key_pem: String,
    /// 0 selects the default.
    pub validity_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceCertArgs {
    pub service_id: String,
    pub pub_key_pem: String,
    pub names: Vec<String>,
    pub validity_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserCertArgs {
    pub user_id: String,
    pub pub_key_pem: String,
    pub validity_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCertArgs {
    pub client_id: String,
    pub cert_pem: String,
}
