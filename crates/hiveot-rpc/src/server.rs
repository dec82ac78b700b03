//! Local method dispatch.
//!
//! A [`Server`] maps `(interface_id, method_id)` to handlers. Calls that match no
//! handler go to an optional [`UnknownMethodHandler`]; this hook is what turns the
//! resolver and the gateway into generic proxies.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use hiveot_kernel::{HubError, HubResult, MethodKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::ClientHook;
use crate::method::{MethodCall, MethodDescriptor, MethodInfo};
use crate::payload::Payload;

type Handler = Arc<dyn Fn(Payload) -> BoxFuture<'static, HubResult<Payload>> + Send + Sync>;

/// Receives calls the server has no handler for.
#[async_trait]
pub trait UnknownMethodHandler: Send + Sync + 'static {
    async fn handle_unknown_method(&self, call: MethodCall) -> HubResult<Payload>;
}

struct Method {
    info: MethodInfo,
    handler: Handler,
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    name: String,
    methods: HashMap<MethodKey, Method>,
    unknown: Option<Arc<dyn UnknownMethodHandler>>,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            unknown: None,
        }
    }

    /// Register a raw handler that sees the undecoded payload.
    pub fn method<F, Fut>(mut self, desc: &MethodDescriptor, handler: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HubResult<Payload>> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |params: Payload| -> BoxFuture<'static, HubResult<Payload>> {
                Box::pin(handler(params))
            },
        );
        self.methods.insert(
            desc.key(),
            Method {
                info: desc.info(),
                handler,
            },
        );
        self
    }

    /// Register a handler with decoded parameters and an encoded result.
    pub fn typed<P, R, F, Fut>(self, desc: &MethodDescriptor, handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HubResult<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.method(desc, move |payload: Payload| {
            let handler = Arc::clone(&handler);
            async move {
                let params: P = payload.decode()?;
                let result = handler(params).await?;
                Payload::encode(&result)
            }
        })
    }

    pub fn with_unknown_method_handler(mut self, handler: Arc<dyn UnknownMethodHandler>) -> Self {
        self.unknown = Some(handler);
        self
    }

    /// Methods registered so far.
    pub fn method_infos(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.values().map(|m| &m.info)
    }

    pub fn build(self) -> Server {
        Server {
            name: self.name,
            methods: self.methods,
            unknown: self.unknown,
        }
    }
}

/// Dispatches calls to registered handlers.
pub struct Server {
    name: String,
    methods: HashMap<MethodKey, Method>,
    unknown: Option<Arc<dyn UnknownMethodHandler>>,
}

impl Server {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method_infos(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.values().map(|m| &m.info)
    }

    pub fn has_method(&self, key: &MethodKey) -> bool {
        self.methods.contains_key(key)
    }
}

#[async_trait]
impl ClientHook for Server {
    async fn call(&self, call: MethodCall) -> HubResult<Payload> {
        if let Some(method) = self.methods.get(&call.key) {
            let handler = Arc::clone(&method.handler);
            return handler(call.params).await;
        }
        match &self.unknown {
            Some(unknown) => {
                debug!("{}: forwarding unknown method {}", self.name, call.key);
                unknown.handle_unknown_method(call).await
            }
            None => Err(HubError::Unimplemented(format!(
                "{} has no method {}",
                self.name, call.key
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("server {}", self.name)
    }
}
