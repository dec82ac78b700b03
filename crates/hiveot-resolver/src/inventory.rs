//! Service connections and the capability index built from them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use hiveot_kernel::{AuthType, CapabilityInfo, HubError, HubResult, MethodKey, Network};
use hiveot_rpc::{Client, Forwarder, RpcConnection};
use tracing::warn;

/// Health of a service connection. A dead connection stays dead; the next scan
/// dials a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Dead,
}

/// The resolver's single connection to one service socket.
pub struct ServiceConnection {
    service_id: String,
    socket_path: PathBuf,
    /// Dial order, used to let the earliest registration win.
    seq: u64,
    conn: RpcConnection,
    forwarder: Forwarder,
    capabilities: Vec<CapabilityInfo>,
    dead: AtomicBool,
}

impl ServiceConnection {
    pub(crate) fn new(
        service_id: String,
        socket_path: PathBuf,
        seq: u64,
        conn: RpcConnection,
        capabilities: Vec<CapabilityInfo>,
    ) -> Self {
        let forwarder = Forwarder::new(conn.bootstrap());
        Self {
            service_id,
            socket_path,
            seq,
            conn,
            forwarder,
            capabilities,
            dead: AtomicBool::new(false),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Bootstrap capability of the service.
    pub fn client(&self) -> &Client {
        self.forwarder.target()
    }

    /// Replays calls on the service's bootstrap capability.
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Snapshot of the last `ListCapabilities` answer.
    pub fn capabilities(&self) -> &[CapabilityInfo] {
        &self.capabilities
    }

    pub fn state(&self) -> ConnectionState {
        if self.dead.load(Ordering::Acquire) || self.conn.is_closed() {
            ConnectionState::Dead
        } else {
            ConnectionState::Connected
        }
    }

    pub fn is_live(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Declare the connection dead and close it. Capabilities obtained through
    /// it break with it.
    pub fn mark_dead(&self, reason: &str) {
        if !self.dead.swap(true, Ordering::AcqRel) {
            warn!(service_id = %self.service_id, "connection dead: {reason}");
            self.conn.close();
        }
    }
}

/// Pin listed capabilities to the service they came from.
///
/// The service id is forced to the socket-derived name and the locator to the
/// socket path. Entries that fail validation or repeat a method key are dropped.
pub fn normalize_capabilities(service_id: &str, socket_path: &Path, listed: Vec<CapabilityInfo>) -> Vec<CapabilityInfo> {
    let address = socket_path.to_string_lossy().into_owned();
    let mut seen = HashMap::new();
    let mut out = Vec::with_capacity(listed.len());
    for mut cap in listed {
        cap.service_id = service_id.to_string();
        cap.network = Network::Unix;
        cap.address = address.clone();
        if let Err(err) = cap.validate() {
            warn!(service_id, "ignoring capability: {err}");
            continue;
        }
        if let Some(first) = seen.insert(cap.key(), cap.method_name.clone()) {
            warn!(service_id, "ignoring '{}': same method key as '{first}'", cap.method_name);
            continue;
        }
        out.push(cap);
    }
    out
}

/// Capabilities of all live services, indexed both ways.
#[derive(Debug, Default, Clone)]
pub struct CapabilityInventory {
    by_key: HashMap<MethodKey, CapabilityInfo>,
    by_name: BTreeMap<(String, String), MethodKey>,
}

impl CapabilityInventory {
    /// Index the live services in dial order. On a key collision the earlier
    /// service keeps the entry.
    pub fn build<'a>(services: impl IntoIterator<Item = &'a ServiceConnection>) -> Self {
        let mut live: Vec<&ServiceConnection> = services.into_iter().filter(|s| s.is_live()).collect();
        live.sort_by_key(|s| s.seq());
        let mut inventory = Self::default();
        for service in live {
            for cap in service.capabilities() {
                if let Err(err) = inventory.insert(cap.clone()) {
                    warn!(service_id = %service.service_id(), "not indexed: {err}");
                }
            }
        }
        inventory
    }

    /// Add one entry. Fails if its key or its `(serviceID, methodName)` is taken.
    pub fn insert(&mut self, cap: CapabilityInfo) -> HubResult<()> {
        cap.validate()?;
        let key = cap.key();
        if let Some(existing) = self.by_key.get(&key) {
            return Err(HubError::invalid_input(format!(
                "{} uses method key {key} already registered by {}",
                cap.external_name(),
                existing.external_name()
            )));
        }
        let name = (cap.service_id.clone(), cap.method_name.clone());
        if self.by_name.contains_key(&name) {
            return Err(HubError::invalid_input(format!("{} registered twice", cap.external_name())));
        }
        self.by_name.insert(name, key);
        self.by_key.insert(key, cap);
        Ok(())
    }

    pub fn get(&self, key: &MethodKey) -> Option<&CapabilityInfo> {
        self.by_key.get(key)
    }

    pub fn find(&self, service_id: &str, method_name: &str) -> Option<&CapabilityInfo> {
        self.by_name
            .get(&(service_id.to_string(), method_name.to_string()))
            .and_then(|key| self.by_key.get(key))
    }

    /// Entries admitting `auth_type`, ordered by `(serviceID, methodName)`.
    pub fn list(&self, auth_type: AuthType) -> Vec<CapabilityInfo> {
        self.by_name
            .values()
            .filter_map(|key| self.by_key.get(key))
            .filter(|cap| cap.admits(auth_type))
            .cloned()
            .collect()
    }

    /// Every entry regardless of role.
    pub fn list_all(&self) -> impl Iterator<Item = &CapabilityInfo> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
