//! Capability records shared by every service, the resolver and the gateway.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::AuthType;
use crate::error::{HubError, HubResult};

/// Protocol name of the built-in capability RPC.
pub const DEFAULT_PROTOCOL: &str = "caprpc";

// ─────────────────────────────────────────────────────────────────────────────
// MethodKey
// ─────────────────────────────────────────────────────────────────────────────

/// Location of a method in the RPC schema: the forward-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    pub interface_id: u64,
    pub method_id: u16,
}

impl MethodKey {
    pub const fn new(interface_id: u64, method_id: u16) -> Self {
        Self {
            interface_id,
            method_id,
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}@{}", self.interface_id, self.method_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Network
// ─────────────────────────────────────────────────────────────────────────────

/// Connection locator family of a capability provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Network {
    #[default]
    Unix,
    Tcp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Tcp => "tcp",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CapabilityInfo
// ─────────────────────────────────────────────────────────────────────────────

/// One row of a capability inventory.
///
/// `(interface_id, method_id)` locates the method; `(service_id, method_name)`
/// is the human-facing key. `address` stays empty when a provider lists its own
/// capabilities since the requester already holds a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub interface_id: u64,
    pub method_id: u16,
    pub interface_name: String,
    pub method_name: String,
    pub service_id: String,
    pub auth_types: BTreeSet<AuthType>,
    pub network: Network,
    pub address: String,
    pub protocol: String,
}

impl CapabilityInfo {
    pub fn new(
        key: MethodKey,
        interface_name: impl Into<String>,
        method_name: impl Into<String>,
        service_id: impl Into<String>,
    ) -> Self {
        Self {
            interface_id: key.interface_id,
            method_id: key.method_id,
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            service_id: service_id.into(),
            auth_types: BTreeSet::new(),
            network: Network::Unix,
            address: String::new(),
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }

    /// Builder: admit the given roles.
    pub fn with_auth_types(mut self, auth_types: impl IntoIterator<Item = AuthType>) -> Self {
        self.auth_types.extend(auth_types);
        self
    }

    /// Builder: set the connection locator.
    pub fn with_address(mut self, network: Network, address: impl Into<String>) -> Self {
        self.network = network;
        self.address = address.into();
        self
    }

    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.interface_id, self.method_id)
    }

    /// Name presented to clients: `serviceID/methodName`.
    pub fn external_name(&self) -> String {
        format!("{}/{}", self.service_id, self.method_name)
    }

    pub fn admits(&self, auth_type: AuthType) -> bool {
        self.auth_types.contains(&auth_type)
    }

    /// Registration checks. An empty role set is never allowed.
    pub fn validate(&self) -> HubResult<()> {
        if self.method_name.trim().is_empty() {
            return Err(HubError::invalid_input("capability has an empty method name"));
        }
        if self.service_id.trim().is_empty() {
            return Err(HubError::invalid_input(format!(
                "capability '{}' has an empty service id",
                self.method_name
            )));
        }
        if self.auth_types.is_empty() {
            return Err(HubError::invalid_input(format!(
                "capability '{}' admits no auth types",
                self.external_name()
            )));
        }
        Ok(())
    }
}
