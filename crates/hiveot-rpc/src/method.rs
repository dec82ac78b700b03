//! Method identities and call records.

use hiveot_kernel::MethodKey;

use crate::payload::Payload;

/// Static description of a schema method.
///
/// Services declare their methods as `const` descriptors; clients use the same
/// constants to address calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub interface_id: u64,
    pub method_id: u16,
    pub interface_name: &'static str,
    pub method_name: &'static str,
}

impl MethodDescriptor {
    pub const fn new(
        interface_id: u64,
        method_id: u16,
        interface_name: &'static str,
        method_name: &'static str,
    ) -> Self {
        Self {
            interface_id,
            method_id,
            interface_name,
            method_name,
        }
    }

    pub const fn key(&self) -> MethodKey {
        MethodKey::new(self.interface_id, self.method_id)
    }

    /// Start a call of this method with the given parameters.
    pub fn call(&self, params: Payload) -> MethodCall {
        MethodCall::new(self.key(), params)
    }

    pub fn info(&self) -> MethodInfo {
        MethodInfo {
            key: self.key(),
            interface_name: self.interface_name.to_string(),
            method_name: self.method_name.to_string(),
        }
    }
}

/// Owned method identity as registered on a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub key: MethodKey,
    pub interface_name: String,
    pub method_name: String,
}

/// A method invocation travelling towards a capability.
///
/// The payload is never interpreted by proxies; only the final server decodes it.
#[derive(Debug)]
pub struct MethodCall {
    pub key: MethodKey,
    pub params: Payload,
}

impl MethodCall {
    pub fn new(key: MethodKey, params: Payload) -> Self {
        Self { key, params }
    }
}
