//! Client of the gateway session protocol.

use std::sync::Arc;

use hiveot_authn::TokenPair;
use hiveot_kernel::{CapabilityInfo, HubResult};
use hiveot_rpc::{Client, RpcConnection};
use hiveot_runtime::transport::{dial, DialOptions};

use crate::api::*;

/// A session on the gateway. Dropping the last clone closes the connection.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    conn: Arc<RpcConnection>,
}

impl GatewayClient {
    /// Connect to `url` (`tcp://`, `ws://` or `wss://`). TLS material in
    /// `opts` decides the session's initial identity.
    pub async fn connect(url: &str, opts: &DialOptions) -> HubResult<Self> {
        let transport = dial(url, opts).await?;
        let conn = RpcConnection::new(format!("client->{url}"), transport, None);
        Ok(Self {
            client: conn.bootstrap(),
            conn: Arc::new(conn),
        })
    }

    /// Bootstrap capability of the session; forwarded service methods are
    /// invoked on it directly.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn connection(&self) -> &RpcConnection {
        &self.conn
    }

    pub fn close(&self) {
        self.conn.close();
    }

    pub async fn ping(&self) -> HubResult<ClientInfo> {
        self.client.invoke(&PING, &()).await
    }

    pub async fn login(&self, client_id: &str, password: &str) -> HubResult<TokenPair> {
        let args = LoginArgs {
            client_id: client_id.to_string(),
            password: password.to_string(),
        };
        self.client.invoke(&LOGIN, &args).await
    }

    pub async fn refresh(&self, client_id: &str, refresh_token: &str) -> HubResult<TokenPair> {
        let args = RefreshArgs {
            client_id: client_id.to_string(),
            refresh_token: refresh_token.to_string(),
        };
        self.client.invoke(&REFRESH, &args).await
    }

    pub async fn authenticate(&self, client_id: &str, access_token: &str) -> HubResult<ClientInfo> {
        let args = AuthenticateArgs {
            client_id: client_id.to_string(),
            access_token: access_token.to_string(),
        };
        self.client.invoke(&AUTHENTICATE, &args).await
    }

    /// Capabilities the session's role may use.
    pub async fn list_capabilities(&self) -> HubResult<Vec<CapabilityInfo>> {
        self.client.invoke(&LIST_CAPABILITIES, &()).await
    }

    /// Handle limited to `service_id/method_name`.
    pub async fn get_capability(&self, service_id: &str, method_name: &str) -> HubResult<Client> {
        let args = GetCapabilityArgs {
            service_id: service_id.to_string(),
            method_name: method_name.to_string(),
        };
        self.client.invoke_cap(&GET_CAPABILITY, &args).await
    }
}
