//! HiveOT certificate service.
//!
//! A single self-signed [`HubCa`] signs device, service and user certificates.
//! The role is carried in the certificate OU and read back by the gateway
//! when a client connects with the certificate.

pub mod api;
pub mod ca;
pub mod client;
pub mod issuer;
pub mod renew;
pub mod service;

pub use api::SERVICE_ID;
pub use ca::{write_private_key, HubCa, DEFAULT_CA_VALIDITY_DAYS};
pub use client::{CertsClient, DeviceCertsClient, ServiceCertsClient, UserCertsClient, VerifyCertsClient};
pub use issuer::{CertIssuer, IssuedCert};
pub use renew::{default_service_names, load_or_create_key, load_service_tls, renew_service_cert, ServiceTls};
pub use service::{CertsConfig, CertsService, DeviceCerts, ServiceCerts, UserCerts, VerifyCerts};
