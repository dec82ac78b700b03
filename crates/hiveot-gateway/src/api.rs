//! Wire interface of a gateway session.
//!
//! These are the methods a session answers itself. Any other method key is
//! checked against the resolver inventory and the session role, then
//! forwarded.

use hiveot_kernel::AuthType;
use hiveot_rpc::MethodDescriptor;
use serde::{Deserialize, Serialize};

pub const SERVICE_ID: &str = "gateway";

pub const GATEWAY_INTERFACE_ID: u64 = 0x6a7e_3b19_c804_d2e1;

const IFACE: &str = "GatewaySession";

/// `Ping() -> ClientInfo`
pub const PING: MethodDescriptor = MethodDescriptor::new(GATEWAY_INTERFACE_ID, 0, IFACE, "Ping");
/// `Login(LoginArgs) -> TokenPair`
pub const LOGIN: MethodDescriptor = MethodDescriptor::new(GATEWAY_INTERFACE_ID, 1, IFACE, "Login");
/// `Refresh(RefreshArgs) -> TokenPair`
pub const REFRESH: MethodDescriptor = MethodDescriptor::new(GATEWAY_INTERFACE_ID, 2, IFACE, "Refresh");
/// `Authenticate(AuthenticateArgs) -> ClientInfo`
pub const AUTHENTICATE: MethodDescriptor = MethodDescriptor::new(GATEWAY_INTERFACE_ID, 3, IFACE, "Authenticate");
/// `ListCapabilities() -> Vec<CapabilityInfo>`
pub const LIST_CAPABILITIES: MethodDescriptor =
    MethodDescriptor::new(GATEWAY_INTERFACE_ID, 4, IFACE, "ListCapabilities");
/// `GetCapability(GetCapabilityArgs) -> capability`
pub const GET_CAPABILITY: MethodDescriptor = MethodDescriptor::new(GATEWAY_INTERFACE_ID, 5, IFACE, "GetCapability");

/// Identity of a session as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub auth_type: AuthType,
}

impl ClientInfo {
    pub fn unauthenticated() -> Self {
        Self {
            client_id: String::new(),
            auth_type: AuthType::Unauthenticated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshArgs {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateArgs {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCapabilityArgs {
    #[serde(rename = "serviceID")]
    pub service_id: String,
    pub method_name: String,
}
