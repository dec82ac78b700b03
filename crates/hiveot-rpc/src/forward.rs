//! Generic method forwarding.
//!
//! A [`Forwarder`] replays a call on another capability. The parameter content is
//! copied as is and the embedded capabilities are handed over to the target
//! connection, so the proxy never needs to know the interface it forwards.

use hiveot_kernel::HubResult;
use tracing::debug;

use crate::client::Client;
use crate::method::MethodCall;
use crate::payload::Payload;

/// Replays calls on a target capability.
#[derive(Clone)]
pub struct Forwarder {
    target: Client,
}

impl Forwarder {
    pub fn new(target: Client) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Client {
        &self.target
    }

    pub async fn forward(&self, call: MethodCall) -> HubResult<Payload> {
        debug!("forwarding {} to {:?}", call.key, self.target);
        self.target.call(call).await
    }

    /// Forward and pass every capability in the reply through `wrap`.
    pub async fn forward_wrapped(
        &self,
        call: MethodCall,
        wrap: impl FnMut(Client) -> Client,
    ) -> HubResult<Payload> {
        let reply = self.forward(call).await?;
        Ok(reply.map_caps(wrap))
    }
}
