//! Capability provider embedded by every service.
//!
//! The provider wraps the service's [`ServerBuilder`], remembers which of its
//! methods exist, keeps the subset the service chose to export and answers
//! `ListCapabilities` with that subset. Unexported methods stay callable by
//! anyone holding a direct connection to the service socket.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use hiveot_kernel::{AuthType, CapabilityInfo, HubError, HubResult};
use hiveot_rpc::{Client, MethodDescriptor, MethodInfo, ServerBuilder};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::serve::serve_connections;
use crate::transport::StreamListener;

pub const CAP_PROVIDER_INTERFACE_ID: u64 = 0xd9a2_1c4b_6e30_7f15;

/// `ListCapabilities() -> Vec<CapabilityInfo>`
pub const LIST_CAPABILITIES: MethodDescriptor =
    MethodDescriptor::new(CAP_PROVIDER_INTERFACE_ID, 0, "CapProvider", "ListCapabilities");

type ExportTable = Arc<RwLock<BTreeMap<String, CapabilityInfo>>>;

pub struct CapProvider {
    service_id: String,
    known_methods: HashMap<String, MethodInfo>,
    exported: ExportTable,
    client: Client,
}

impl CapProvider {
    /// Take over `builder`, adding the `ListCapabilities` handler.
    pub fn new(service_id: impl Into<String>, builder: ServerBuilder) -> Self {
        let service_id = service_id.into();
        let known_methods = builder
            .method_infos()
            .map(|info| (info.method_name.clone(), info.clone()))
            .collect();
        let exported: ExportTable = Arc::default();
        let table = Arc::clone(&exported);
        let server = builder
            .typed(&LIST_CAPABILITIES, move |_: ()| {
                let list: Vec<CapabilityInfo> = table.read().values().cloned().collect();
                async move { Ok::<_, HubError>(list) }
            })
            .build();
        Self {
            service_id,
            known_methods,
            exported,
            client: Client::new(server),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Export `method_name` to callers with one of `auth_types`.
    ///
    /// Fails with `UnknownMethod` when the service has no such method and with
    /// `InvalidInput` when no role is admitted. Services call this at startup
    /// and abort on error.
    pub fn export_capability(
        &self,
        method_name: &str,
        auth_types: impl IntoIterator<Item = AuthType>,
    ) -> HubResult<()> {
        let info = self.known_methods.get(method_name).ok_or_else(|| {
            HubError::UnknownMethod(format!(
                "{} has no method '{method_name}' to export",
                self.service_id
            ))
        })?;
        let capability = CapabilityInfo::new(
            info.key,
            info.interface_name.clone(),
            info.method_name.clone(),
            self.service_id.clone(),
        )
        .with_auth_types(auth_types);
        capability.validate()?;
        debug!("{}: exporting {}", self.service_id, capability.external_name());
        self.exported.write().insert(method_name.to_string(), capability);
        Ok(())
    }

    /// Exported capabilities, ordered by method name.
    pub fn list_capabilities(&self) -> Vec<CapabilityInfo> {
        self.exported.read().values().cloned().collect()
    }

    /// In-process client of the provider's server.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Serve the service methods plus `ListCapabilities` on every connection
    /// accepted from `listener`, until it closes or `shutdown` fires.
    pub async fn start<L: StreamListener>(&self, listener: L, shutdown: CancellationToken) -> HubResult<()> {
        let client = self.client.clone();
        serve_connections(&self.service_id, listener, shutdown, move |_peer, _remote| {
            let client = client.clone();
            async move { Ok((client, ())) }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{dial, listen_uds, DialOptions};
    use hiveot_rpc::RpcConnection;

    const ECHO: MethodDescriptor = MethodDescriptor::new(0xec40, 0, "EchoService", "Echo");
    const UPPER: MethodDescriptor = MethodDescriptor::new(0xec40, 1, "EchoService", "Upper");

    fn provider() -> CapProvider {
        let builder = ServerBuilder::new("echo")
            .typed(&ECHO, |text: String| async move { Ok::<_, HubError>(text) })
            .typed(&UPPER, |text: String| async move { Ok::<_, HubError>(text.to_uppercase()) });
        CapProvider::new("echo", builder)
    }

    #[test]
    fn export_requires_known_method_and_role() {
        let provider = provider();
        assert!(matches!(
            provider.export_capability("Missing", [AuthType::Service]),
            Err(HubError::UnknownMethod(_))
        ));
        assert!(matches!(
            provider.export_capability("Echo", Vec::<AuthType>::new()),
            Err(HubError::InvalidInput(_))
        ));
        assert!(provider.list_capabilities().is_empty());
    }

    #[tokio::test]
    async fn lists_only_exported_methods_without_address() {
        let provider = provider();
        provider.export_capability("Echo", [AuthType::Service, AuthType::User]).unwrap();

        let list: Vec<CapabilityInfo> = provider.client().invoke(&LIST_CAPABILITIES, &()).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].service_id, "echo");
        assert_eq!(list[0].key(), ECHO.key());
        assert!(list[0].address.is_empty());

        // unexported methods remain callable
        let upper: String = provider.client().invoke(&UPPER, "abc").await.unwrap();
        assert_eq!(upper, "ABC");
    }

    #[tokio::test]
    async fn serves_over_unix_socket_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.socket");
        let provider = Arc::new(provider());
        provider.export_capability("Echo", [AuthType::Service]).unwrap();

        let shutdown = CancellationToken::new();
        let listener = listen_uds(&path).await.unwrap();
        let task = {
            let provider = Arc::clone(&provider);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { provider.start(listener, shutdown).await })
        };

        let transport = dial(&format!("unix://{}", path.display()), &DialOptions::new()).await.unwrap();
        let conn = RpcConnection::new("test", transport, None);
        let reply: String = conn.bootstrap().invoke(&ECHO, "hi").await.unwrap();
        assert_eq!(reply, "hi");

        shutdown.cancel();
        task.await.unwrap().unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), conn.closed())
            .await
            .unwrap();
    }
}
