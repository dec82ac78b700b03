//! The capability resolver.
//!
//! [`CapResolver`] turns a directory of service sockets into one RPC endpoint.
//! A scan dials every `*.socket` without a live connection, asks the service
//! for its capabilities and rebuilds the inventory. Calls the resolver does
//! not implement itself are forwarded, payload untouched, to the service that
//! advertised the method.
//!
//! Locking: every change to `services` happens under its write lock, and the
//! inventory is rebuilt and swapped while that lock is held. Dials run as
//! their own tasks and merge their connection when they finish. No lock is
//! held across an RPC call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use hiveot_kernel::folders::service_id_from_socket;
use hiveot_kernel::{AuthType, CapabilityInfo, HubError, HubResult, MethodKey};
use hiveot_rpc::{MethodCall, Payload, RpcConnection, ServerBuilder, UnknownMethodHandler};
use hiveot_runtime::transport::{dial, DialOptions};
use hiveot_runtime::{CapProvider, LIST_CAPABILITIES as LIST_PROVIDER_CAPABILITIES};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::*;
use crate::config::ResolverConfig;
use crate::inventory::{normalize_capabilities, CapabilityInventory, ServiceConnection};
use crate::watcher::{is_socket_file, SocketWatcher};

/// Consecutive retries after dial failures before waiting for the next event.
const MAX_DIAL_RETRIES: u32 = 3;

type PendingDial = (String, JoinHandle<HubResult<()>>);

/// Clonable handle of a resolver.
#[derive(Clone)]
pub struct CapResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    socket_dir: PathBuf,
    own_socket: Option<PathBuf>,
    config: ResolverConfig,
    services: RwLock<HashMap<String, Arc<ServiceConnection>>>,
    inventory: RwLock<Arc<CapabilityInventory>>,
    /// Keys whose service went away, with that service. Calls to them fail
    /// with `Transport` rather than `Unimplemented` until the key returns.
    departed: RwLock<HashMap<MethodKey, String>>,
    /// Service ids with a dial in flight.
    dialing: Mutex<HashSet<String>>,
    closed: AtomicBool,
    next_seq: AtomicU64,
    /// Signalled when a service connection closes or is declared dead.
    rescan: Arc<Notify>,
}

impl CapResolver {
    /// Resolver over `socket_dir`. `own_socket` is skipped by scans.
    pub fn new(socket_dir: impl Into<PathBuf>, own_socket: Option<PathBuf>, config: ResolverConfig) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                socket_dir: socket_dir.into(),
                own_socket,
                config,
                services: RwLock::new(HashMap::new()),
                inventory: RwLock::new(Arc::default()),
                departed: RwLock::new(HashMap::new()),
                dialing: Mutex::new(HashSet::new()),
                closed: AtomicBool::new(false),
                next_seq: AtomicU64::new(0),
                rescan: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn socket_dir(&self) -> &Path {
        &self.inner.socket_dir
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Current inventory snapshot.
    pub fn inventory(&self) -> Arc<CapabilityInventory> {
        Arc::clone(&self.inner.inventory.read())
    }

    pub fn list_capabilities(&self, auth_type: AuthType) -> Vec<CapabilityInfo> {
        self.inventory().list(auth_type)
    }

    pub fn find_capability(&self, service_id: &str, method_name: &str) -> HubResult<CapabilityInfo> {
        self.inventory()
            .find(service_id, method_name)
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("no capability {service_id}/{method_name}")))
    }

    pub fn find_method(&self, key: MethodKey) -> HubResult<CapabilityInfo> {
        self.inventory()
            .get(&key)
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("no capability with method key {key}")))
    }

    pub fn connection(&self, service_id: &str) -> Option<Arc<ServiceConnection>> {
        self.inner.services.read().get(service_id).cloned()
    }

    pub fn status(&self) -> ResolverStatus {
        let mut connected_services: Vec<String> = self
            .inner
            .services
            .read()
            .values()
            .filter(|c| c.is_live())
            .map(|c| c.service_id().to_string())
            .collect();
        connected_services.sort();
        ResolverStatus {
            connected_services,
            capability_count: self.inventory().len(),
        }
    }

    /// Sync the connections with the socket directory and wait for the dials.
    ///
    /// Live connections are kept. Dead connections and connections whose socket
    /// disappeared are dropped; sockets without a live connection are dialed.
    /// Each dial merges into the inventory as soon as it completes, so a slow
    /// service only delays itself.
    pub async fn scan(&self) -> HubResult<ScanReport> {
        let (mut report, dials) = self.start_scan()?;
        for (service_id, dial) in dials {
            match dial.await {
                Ok(Ok(())) => report.connected.push(service_id),
                Ok(Err(_)) => report.failed.push(service_id),
                Err(err) => {
                    warn!(service_id = %service_id, "dial task failed: {err}");
                    report.failed.push(service_id);
                }
            }
        }
        Ok(report)
    }

    /// Drop stale services and spawn a dial for every new socket.
    ///
    /// Sockets with a dial in flight are skipped. The report lists removals only.
    fn start_scan(&self) -> HubResult<(ScanReport, Vec<PendingDial>)> {
        let sockets = self.list_sockets()?;
        let mut report = ScanReport::default();
        let to_dial: Vec<(String, PathBuf)> = {
            let mut services = self.inner.services.write();
            services.retain(|service_id, conn| {
                let socket_present = sockets.get(service_id).map(PathBuf::as_path) == Some(conn.socket_path());
                let keep = conn.is_live() && socket_present;
                if !keep {
                    conn.mark_dead("socket removed or connection lost");
                    report.removed.push(service_id.clone());
                }
                keep
            });
            if !report.removed.is_empty() {
                let capabilities = self.publish(&services);
                info!(removed = ?report.removed, capabilities, "inventory updated");
            }
            let mut dialing = self.inner.dialing.lock();
            sockets
                .into_iter()
                .filter(|(id, _)| !services.contains_key(id) && dialing.insert(id.clone()))
                .collect()
        };
        if report.removed.is_empty() && to_dial.is_empty() {
            debug!("scan found no changes");
        }

        let dials = to_dial
            .into_iter()
            .map(|(service_id, path)| {
                let resolver = self.clone();
                let id = service_id.clone();
                let dial = tokio::spawn(async move { resolver.dial_and_merge(id, path).await });
                (service_id, dial)
            })
            .collect();
        Ok((report, dials))
    }

    async fn dial_and_merge(&self, service_id: String, path: PathBuf) -> HubResult<()> {
        let result = self.connect(&service_id, &path).await;
        let mut services = self.inner.services.write();
        self.inner.dialing.lock().remove(&service_id);
        let conn = match result {
            Ok(conn) => conn,
            Err(err) => {
                warn!(service_id = %service_id, "cannot connect: {err}");
                return Err(err);
            }
        };
        if self.inner.closed.load(Ordering::Acquire) {
            conn.mark_dead("resolver closing");
            return Err(HubError::transport("resolver is closed"));
        }
        services.insert(service_id.clone(), Arc::new(conn));
        let capabilities = self.publish(&services);
        info!(connected = %service_id, capabilities, "inventory updated");
        Ok(())
    }

    /// Rebuild the inventory from `services` and record departed keys.
    ///
    /// Callers hold the `services` write lock.
    fn publish(&self, services: &HashMap<String, Arc<ServiceConnection>>) -> usize {
        let inventory = Arc::new(CapabilityInventory::build(services.values().map(Arc::as_ref)));
        let previous = std::mem::replace(&mut *self.inner.inventory.write(), Arc::clone(&inventory));
        let mut departed = self.inner.departed.write();
        departed.retain(|key, _| inventory.get(key).is_none());
        for cap in previous.list_all() {
            if inventory.get(&cap.key()).is_none() {
                departed.insert(cap.key(), cap.service_id.clone());
            }
        }
        inventory.len()
    }

    /// Service sockets in the directory, keyed by service id.
    fn list_sockets(&self) -> HubResult<BTreeMap<String, PathBuf>> {
        let entries = match std::fs::read_dir(&self.inner.socket_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("socket directory {} does not exist yet", self.inner.socket_dir.display());
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut sockets = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_socket_file(&path) || self.inner.own_socket.as_deref() == Some(path.as_path()) {
                continue;
            }
            if let Some(service_id) = service_id_from_socket(&path) {
                sockets.insert(service_id, path);
            }
        }
        Ok(sockets)
    }

    async fn connect(&self, service_id: &str, path: &Path) -> HubResult<ServiceConnection> {
        let timeout = self.inner.config.dial_timeout();
        let url = format!("unix://{}", path.display());
        let transport = dial(&url, &DialOptions::new().with_timeout(timeout)).await?;
        let conn = RpcConnection::new(format!("resolver->{service_id}"), transport, None);

        let listed: Vec<CapabilityInfo> =
            tokio::time::timeout(timeout, conn.bootstrap().invoke(&LIST_PROVIDER_CAPABILITIES, &()))
                .await
                .map_err(|_| HubError::transport(format!("{service_id} did not list its capabilities in time")))??;
        let capabilities = normalize_capabilities(service_id, path, listed);

        let closed = conn.close_token();
        let rescan = Arc::clone(&self.inner.rescan);
        tokio::spawn(async move {
            closed.cancelled().await;
            rescan.notify_one();
        });

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        info!(service_id, capabilities = capabilities.len(), "service connected");
        Ok(ServiceConnection::new(
            service_id.to_string(),
            path.to_path_buf(),
            seq,
            conn,
            capabilities,
        ))
    }

    /// Forward a call to the service owning its method key.
    ///
    /// A transport failure marks the owning connection dead.
    pub async fn forward(&self, call: MethodCall) -> HubResult<Payload> {
        let Some(service_id) = self.inventory().get(&call.key).map(|cap| cap.service_id.clone()) else {
            if let Some(service_id) = self.inner.departed.read().get(&call.key) {
                return Err(HubError::transport(format!("service {service_id} is not connected")));
            }
            return Err(HubError::Unimplemented(format!("no capability with method key {}", call.key)));
        };
        let conn = self
            .connection(&service_id)
            .filter(|c| c.is_live())
            .ok_or_else(|| HubError::transport(format!("service {service_id} is not connected")))?;

        debug!(service_id = %service_id, method = %call.key, "forwarding");
        match conn.forwarder().forward(call).await {
            Err(err) if err.is_transport() => {
                conn.mark_dead(&err.to_string());
                Err(err)
            }
            result => result,
        }
    }

    /// Drop every service connection.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let services: Vec<_> = self.inner.services.write().drain().map(|(_, c)| c).collect();
        for conn in &services {
            conn.mark_dead("resolver closing");
        }
        *self.inner.inventory.write() = Arc::default();
        self.inner.departed.write().clear();
    }

    /// Watch the socket directory and rescan until `shutdown` fires.
    ///
    /// Rescans happen after socket events (debounced), periodically, after a
    /// service connection is lost, and shortly after a dial fails. Dials are
    /// never awaited here, so events keep flowing while a service is slow.
    pub async fn run(&self, shutdown: CancellationToken) -> HubResult<()> {
        let (_watcher, mut events) = SocketWatcher::start(&self.inner.socket_dir)?;
        let config = &self.inner.config;
        let mut ticker = config.scan_interval().map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut retries = 0u32;
        let mut retry_at: Option<Instant> = None;
        let mut dials = FuturesUnordered::new();

        self.scan_in_background(&mut dials);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(_) = events.recv() => {
                    tokio::time::sleep(config.debounce()).await;
                    while events.try_recv().is_ok() {}
                    retries = 0;
                }
                _ = tick(&mut ticker) => {}
                _ = sleep_until(retry_at) => retry_at = None,
                _ = self.inner.rescan.notified() => {
                    tokio::time::sleep(config.debounce()).await;
                }
                Some((service_id, connected)) = dials.next(), if !dials.is_empty() => {
                    if !connected && retry_at.is_none() && retries < MAX_DIAL_RETRIES {
                        retries += 1;
                        retry_at = Some(Instant::now() + config.retry_delay());
                        debug!(service_id = %service_id, "retrying in {:?}", config.retry_delay());
                    }
                    continue;
                }
            }
            self.scan_in_background(&mut dials);
        }
        self.close();
        info!("resolver stopped");
        Ok(())
    }

    fn scan_in_background(&self, dials: &mut FuturesUnordered<BoxFuture<'static, (String, bool)>>) {
        match self.start_scan() {
            Ok((_, pending)) => dials.extend(pending.into_iter().map(|(id, dial)| dial_outcome(id, dial))),
            Err(err) => warn!("scan of {} failed: {err}", self.inner.socket_dir.display()),
        }
    }

    /// The resolver's own RPC server. Unknown methods are forwarded.
    pub fn provider(&self) -> HubResult<CapProvider> {
        let ping = self.clone();
        let list = self.clone();
        let find = self.clone();
        let find_method = self.clone();
        let refresh = self.clone();
        let builder = ServerBuilder::new(SERVICE_ID)
            .typed(&PING, move |_: ()| {
                let status = ping.status();
                async move { Ok::<_, HubError>(status) }
            })
            .typed(&LIST_CAPABILITIES, move |auth_type: AuthType| {
                let caps = list.list_capabilities(auth_type);
                async move { Ok::<_, HubError>(caps) }
            })
            .typed(&FIND_CAPABILITY, move |args: FindCapabilityArgs| {
                let result = find.find_capability(&args.service_id, &args.method_name);
                async move { result }
            })
            .typed(&FIND_METHOD, move |key: MethodKey| {
                let result = find_method.find_method(key);
                async move { result }
            })
            .typed(&REFRESH, move |_: ()| {
                let resolver = refresh.clone();
                async move { resolver.scan().await }
            })
            .with_unknown_method_handler(Arc::new(ForwardToService(self.clone())));

        let provider = CapProvider::new(SERVICE_ID, builder);
        for method in [PING, LIST_CAPABILITIES, FIND_CAPABILITY, FIND_METHOD, REFRESH] {
            provider.export_capability(method.method_name, [AuthType::Service])?;
        }
        Ok(provider)
    }
}

struct ForwardToService(CapResolver);

#[async_trait]
impl UnknownMethodHandler for ForwardToService {
    async fn handle_unknown_method(&self, call: MethodCall) -> HubResult<Payload> {
        self.0.forward(call).await
    }
}

fn dial_outcome(service_id: String, dial: JoinHandle<HubResult<()>>) -> BoxFuture<'static, (String, bool)> {
    async move {
        let connected = matches!(dial.await, Ok(Ok(())));
        (service_id, connected)
    }
    .boxed()
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
