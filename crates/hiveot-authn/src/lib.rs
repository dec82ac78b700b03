//! HiveOT session authentication.
//!
//! [`SessionAuth`] mints ES256 access and refresh tokens for clients whose
//! password was accepted by a [`CredentialStore`], and verifies them on later
//! connections.

pub mod store;
pub mod token;

pub use store::{hash_password, CredentialStore, MemoryCredentialStore, UserEntry};
pub use token::{
    Claims, SessionAuth, TokenPair, TokenSubject, TokenVerifier, DEFAULT_ACCESS_TOKEN_VALIDITY,
    DEFAULT_ISSUER, DEFAULT_REFRESH_TOKEN_VALIDITY,
};
