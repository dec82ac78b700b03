//! Capability handles.
//!
//! A [`Client`] is a cheap, clonable reference to something that answers method
//! calls: a local [`Server`](crate::server::Server), a capability imported over a
//! connection, or a wrapper around either. Dropping the last clone of an imported
//! capability releases it on the peer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hiveot_kernel::{HubError, HubResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::method::{MethodCall, MethodDescriptor};
use crate::payload::Payload;

/// Implementation behind a [`Client`].
#[async_trait]
pub trait ClientHook: Send + Sync + 'static {
    /// Deliver a call and wait for its result.
    async fn call(&self, call: MethodCall) -> HubResult<Payload>;

    /// Whether calls can still succeed. Broken handles stay broken.
    fn is_valid(&self) -> bool {
        true
    }

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Reference to a capability.
#[derive(Clone)]
pub struct Client {
    hook: Arc<dyn ClientHook>,
}

impl Client {
    pub fn new(hook: impl ClientHook) -> Self {
        Self {
            hook: Arc::new(hook),
        }
    }

    pub fn from_arc(hook: Arc<dyn ClientHook>) -> Self {
        Self { hook }
    }

    /// A handle whose every call fails with `err`.
    pub fn broken(err: HubError) -> Self {
        Self::new(BrokenClient { err })
    }

    pub async fn call(&self, call: MethodCall) -> HubResult<Payload> {
        self.hook.call(call).await
    }

    /// Encode `params`, call `method` and decode the result.
    pub async fn invoke<P, R>(&self, method: &MethodDescriptor, params: &P) -> HubResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let reply = self.call(method.call(Payload::encode(params)?)).await?;
        reply.decode()
    }

    /// Call a method that returns a single capability.
    pub async fn invoke_cap<P>(&self, method: &MethodDescriptor, params: &P) -> HubResult<Client>
    where
        P: Serialize + ?Sized,
    {
        let reply = self.call(method.call(Payload::encode(params)?)).await?;
        reply.into_cap()
    }

    pub fn is_valid(&self) -> bool {
        self.hook.is_valid()
    }

    /// True if both handles refer to the same underlying object.
    pub fn same_as(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.hook, &other.hook)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.hook.describe())
    }
}

struct BrokenClient {
    err: HubError,
}

#[async_trait]
impl ClientHook for BrokenClient {
    async fn call(&self, _call: MethodCall) -> HubResult<Payload> {
        Err(self.err.clone())
    }

    fn is_valid(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("broken: {}", self.err)
    }
}
