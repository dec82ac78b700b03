//! Command implementations

pub mod certs;
pub mod gateway;
