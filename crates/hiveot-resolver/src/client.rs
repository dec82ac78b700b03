//! Client of the resolver.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hiveot_kernel::{AuthType, CapabilityInfo, HubResult, MethodKey};
use hiveot_rpc::{Client, RpcConnection};
use hiveot_runtime::transport::{dial, DialOptions};

use crate::api::*;

/// Typed access to the resolver's own methods. [`ResolverClient::client`]
/// reaches every forwarded service capability as well.
#[derive(Clone)]
pub struct ResolverClient {
    client: Client,
    /// Keeps a dialed connection open while any clone is alive.
    conn: Option<Arc<RpcConnection>>,
}

impl ResolverClient {
    /// Wrap an existing capability, for example an in-process provider.
    pub fn new(client: Client) -> Self {
        Self { client, conn: None }
    }

    /// Dial the resolver socket.
    pub async fn connect(socket_path: &Path, timeout: Duration) -> HubResult<Self> {
        let url = format!("unix://{}", socket_path.display());
        let transport = dial(&url, &DialOptions::new().with_timeout(timeout)).await?;
        let conn = RpcConnection::new(format!("client->{SERVICE_ID}"), transport, None);
        Ok(Self {
            client: conn.bootstrap(),
            conn: Some(Arc::new(conn)),
        })
    }

    /// Bootstrap capability of the resolver.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The dialed connection, `None` for wrapped capabilities.
    pub fn connection(&self) -> Option<&RpcConnection> {
        self.conn.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.is_closed())
    }

    pub async fn ping(&self) -> HubResult<ResolverStatus> {
        self.client.invoke(&PING, &()).await
    }

    pub async fn list_capabilities(&self, auth_type: AuthType) -> HubResult<Vec<CapabilityInfo>> {
        self.client.invoke(&LIST_CAPABILITIES, &auth_type).await
    }

    pub async fn find_capability(&self, service_id: &str, method_name: &str) -> HubResult<CapabilityInfo> {
        let args = FindCapabilityArgs {
            service_id: service_id.to_string(),
            method_name: method_name.to_string(),
        };
        self.client.invoke(&FIND_CAPABILITY, &args).await
    }

    pub async fn find_method(&self, key: MethodKey) -> HubResult<CapabilityInfo> {
        self.client.invoke(&FIND_METHOD, &key).await
    }

    /// Force a scan and return its outcome.
    pub async fn refresh(&self) -> HubResult<ScanReport> {
        self.client.invoke(&REFRESH, &()).await
    }
}
