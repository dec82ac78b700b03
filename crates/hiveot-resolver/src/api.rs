//! Wire interface of the resolver's own methods.
//!
//! Every other method reaching the resolver is forwarded to the service that
//! advertised it.

use hiveot_rpc::MethodDescriptor;
use serde::{Deserialize, Serialize};

pub const SERVICE_ID: &str = "resolver";

pub const RESOLVER_INTERFACE_ID: u64 = 0xb41e_77c0_2d5a_9e01;

/// `Ping() -> ResolverStatus`
pub const PING: MethodDescriptor = MethodDescriptor::new(RESOLVER_INTERFACE_ID, 0, "CapResolverService", "Ping");
/// `ListCapabilities(AuthType) -> Vec<CapabilityInfo>`
pub const LIST_CAPABILITIES: MethodDescriptor =
    MethodDescriptor::new(RESOLVER_INTERFACE_ID, 1, "CapResolverService", "ListCapabilities");
/// `FindCapability(FindCapabilityArgs) -> CapabilityInfo`
pub const FIND_CAPABILITY: MethodDescriptor =
    MethodDescriptor::new(RESOLVER_INTERFACE_ID, 2, "CapResolverService", "FindCapability");
/// `FindMethod(MethodKey) -> CapabilityInfo`
pub const FIND_METHOD: MethodDescriptor =
    MethodDescriptor::new(RESOLVER_INTERFACE_ID, 3, "CapResolverService", "FindMethod");
/// `Refresh() -> ScanReport`
pub const REFRESH: MethodDescriptor = MethodDescriptor::new(RESOLVER_INTERFACE_ID, 4, "CapResolverService", "Refresh");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindCapabilityArgs {
    pub service_id: String,
    pub method_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStatus {
    pub connected_services: Vec<String>,
    pub capability_count: usize,
}

/// Outcome of one directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Services dialed during this scan.
    pub connected: Vec<String>,
    /// Services dropped because their socket vanished or the connection died.
    pub removed: Vec<String>,
    /// Sockets that could not be dialed or listed.
    pub failed: Vec<String>,
}

impl ScanReport {
    pub fn changed(&self) -> bool {
        !self.connected.is_empty() || !self.removed.is_empty()
    }
}
