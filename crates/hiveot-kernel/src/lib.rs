//! HiveOT kernel: the vocabulary shared by every hub crate.
//!
//! - [`error`]: the hub error type and its propagation kinds
//! - [`auth`]: client roles and certificate roles
//! - [`capability`]: capability inventory records
//! - [`folders`]: installation folder layout
//! - [`config`]: optional YAML service configuration (feature `config`)
//! - [`logging`]: tracing subscriber setup

pub mod auth;
pub mod capability;
#[cfg(feature = "config")]
pub mod config;
pub mod error;
pub mod folders;
pub mod logging;

pub use auth::{AuthType, CertRole};
pub use capability::{CapabilityInfo, MethodKey, Network, DEFAULT_PROTOCOL};
pub use error::{ErrorKind, HubError, HubResult};
pub use folders::AppFolders;
