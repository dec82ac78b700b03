//! Client roles.
//!
//! [`AuthType`] is the role a session or capability deals in. [`CertRole`] is the
//! subset that can be encoded in the OU field of an issued certificate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Role of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthType {
    Unauthenticated,
    IoTDevice,
    User,
    Service,
}

impl AuthType {
    pub const ALL: [AuthType; 4] = [
        AuthType::Unauthenticated,
        AuthType::IoTDevice,
        AuthType::User,
        AuthType::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::IoTDevice => "IoTDevice",
            Self::User => "User",
            Self::Service => "Service",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unauthenticated" => Ok(Self::Unauthenticated),
            "IoTDevice" => Ok(Self::IoTDevice),
            "User" => Ok(Self::User),
            "Service" => Ok(Self::Service),
            other => Err(HubError::invalid_input(format!("unknown auth type '{other}'"))),
        }
    }
}

/// Role encoded in a certificate's organizational unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertRole {
    IoTDevice,
    Service,
    User,
}

impl CertRole {
    /// The OU value written into issued certificates.
    pub fn ou(&self) -> &'static str {
        match self {
            Self::IoTDevice => "IoTDevice",
            Self::Service => "Service",
            Self::User => "User",
        }
    }

    /// Parse an OU value. Unknown units are not a role.
    pub fn from_ou(ou: &str) -> Option<Self> {
        match ou {
            "IoTDevice" => Some(Self::IoTDevice),
            "Service" => Some(Self::Service),
            "User" => Some(Self::User),
            _ => None,
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::IoTDevice => AuthType::IoTDevice,
            Self::Service => AuthType::Service,
            Self::User => AuthType::User,
        }
    }

    /// Default certificate validity for the role, in days.
    pub fn default_validity_days(&self) -> u32 {
        match self {
            Self::IoTDevice => 30,
            Self::Service => 90,
            Self::User => 365,
        }
    }
}

impl fmt::Display for CertRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ou())
    }
}
