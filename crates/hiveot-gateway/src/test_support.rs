//! Echo service and in-process resolver for gateway tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hiveot_authn::{MemoryCredentialStore, SessionAuth};
use hiveot_kernel::{AuthType, HubError};
use hiveot_resolver::{CapResolver, ResolverClient, ResolverConfig};
use hiveot_rpc::{MethodDescriptor, ServerBuilder};
use hiveot_runtime::transport::listen_uds;
use hiveot_runtime::CapProvider;
use tokio_util::sync::CancellationToken;

use crate::gateway::GatewayService;

const ECHO_IFACE: u64 = 0xec40_0002;

/// `Echo(String) -> String`, users only.
pub const ECHO: MethodDescriptor = MethodDescriptor::new(ECHO_IFACE, 0, "EchoService", "Echo");
/// `Hello() -> String`, open to everyone.
pub const HELLO: MethodDescriptor = MethodDescriptor::new(ECHO_IFACE, 1, "EchoService", "Hello");
/// Implemented by the service but never exported.
pub const HIDDEN: MethodDescriptor = MethodDescriptor::new(ECHO_IFACE, 2, "EchoService", "Hidden");

pub struct Hub {
    pub resolver: CapResolver,
    pub gateway: GatewayService,
    pub echo_calls: Arc<AtomicUsize>,
    stop: CancellationToken,
}

impl Hub {
    /// Echo service on a socket in `dir`, scanned by an in-process resolver.
    pub async fn start(dir: &Path) -> Self {
        let echo_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&echo_calls);
        let builder = ServerBuilder::new("echo")
            .typed(&ECHO, move |text: String| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, HubError>(text) }
            })
            .typed(&HELLO, |_: ()| async move { Ok::<_, HubError>("hello".to_string()) })
            .typed(&HIDDEN, |_: ()| async move { Ok::<_, HubError>("hidden".to_string()) });
        let provider = CapProvider::new("echo", builder);
        provider.export_capability("Echo", [AuthType::User, AuthType::Service]).unwrap();
        provider.export_capability("Hello", AuthType::ALL).unwrap();

        let stop = CancellationToken::new();
        let listener = listen_uds(&dir.join("echo.socket")).await.unwrap();
        let token = stop.clone();
        tokio::spawn(async move { provider.start(listener, token).await });

        let resolver = CapResolver::new(dir, None, ResolverConfig::default());
        resolver.scan().await.unwrap();
        let resolver_client = ResolverClient::new(resolver.provider().unwrap().client());

        let store = MemoryCredentialStore::new();
        store.add_user("alice", "pw1").unwrap();
        let auth = SessionAuth::generate("test").unwrap();
        let gateway = GatewayService::new(Arc::new(auth), Arc::new(store), Arc::new(resolver_client));
        Self {
            resolver,
            gateway,
            echo_calls,
            stop,
        }
    }

    pub fn echo_calls(&self) -> usize {
        self.echo_calls.load(Ordering::SeqCst)
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.stop.cancel();
        self.resolver.close();
    }
}
