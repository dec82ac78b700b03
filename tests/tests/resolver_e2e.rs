//! Discovery and forwarding through a resolver watching a real run folder.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use hiveot_kernel::{AuthType, HubError};
use hiveot_resolver::{CapResolver, ResolverClient, ResolverConfig};
use hiveot_testing::{eventually, EchoService, ECHO};
use tokio_util::sync::CancellationToken;

const SCAN_INTERVAL: Duration = Duration::from_millis(200);
const DIAL_TIMEOUT: Duration = Duration::from_millis(500);

struct Running {
    resolver: CapResolver,
    client: ResolverClient,
    stop: CancellationToken,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn start_resolver(run_dir: &Path) -> Running {
    let config = ResolverConfig {
        scan_interval_ms: SCAN_INTERVAL.as_millis() as u64,
        dial_timeout_ms: DIAL_TIMEOUT.as_millis() as u64,
        ..ResolverConfig::default()
    };
    let resolver = CapResolver::new(run_dir, None, config);
    let client = ResolverClient::new(resolver.provider().unwrap().client());
    let stop = CancellationToken::new();
    let runner = resolver.clone();
    let token = stop.clone();
    tokio::spawn(async move { runner.run(token).await });
    Running { resolver, client, stop }
}

async fn echo(client: &ResolverClient, text: &str) -> Result<String, HubError> {
    client.client().invoke(&ECHO, text).await
}

#[tokio::test]
async fn new_service_is_discovered_within_a_second() {
    let dir = tempfile::tempdir().unwrap();
    let hub = start_resolver(dir.path());
    assert!(hub.resolver.list_capabilities(AuthType::Service).is_empty());

    let service = EchoService::start(dir.path(), "echo", &[AuthType::Service]).await.unwrap();
    let client = &hub.client;
    let found = eventually(Duration::from_secs(1), || async move {
        let caps = client.list_capabilities(AuthType::Service).await.ok()?;
        (!caps.is_empty()).then_some(caps)
    })
    .await
    .expect("echo capability not discovered within 1s");

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].service_id, "echo");
    assert_eq!(found[0].method_name, "Echo");
    assert_eq!(found[0].auth_types.iter().copied().collect::<Vec<_>>(), vec![AuthType::Service]);
    assert!(hub.client.list_capabilities(AuthType::User).await.unwrap().is_empty());
    service.stop().await;
}

#[tokio::test]
async fn forwarding_survives_a_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let hub = start_resolver(dir.path());

    let client = &hub.client;
    let service = EchoService::start(dir.path(), "echo", &[AuthType::Service]).await.unwrap();
    let reply = eventually(Duration::from_secs(1), || async move { echo(client, "hello").await.ok() }).await;
    assert_eq!(reply.as_deref(), Some("hello"));
    assert_eq!(service.calls(), 1);

    service.stop().await;
    let err = eventually(Duration::from_secs(1), || async move { echo(client, "hello").await.err() })
        .await
        .expect("calls kept succeeding after the service stopped");
    assert!(err.is_transport(), "expected Transport, got {err}");
    // stays unavailable until the service comes back
    let err = echo(&hub.client, "hello").await.unwrap_err();
    assert!(err.is_transport(), "expected Transport, got {err}");

    let service = EchoService::start(dir.path(), "echo", &[AuthType::Service]).await.unwrap();
    let reply = eventually(SCAN_INTERVAL + DIAL_TIMEOUT, || async move { echo(client, "again").await.ok() }).await;
    assert_eq!(reply.as_deref(), Some("again"));
    assert_eq!(service.calls(), 1);
    service.stop().await;
}

#[tokio::test]
async fn inventory_keys_stay_unique_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let hub = start_resolver(dir.path());

    // both services export the same method key
    let first = EchoService::start(dir.path(), "echo-a", &[AuthType::Service]).await.unwrap();
    let second = EchoService::start(dir.path(), "echo-b", &[AuthType::User]).await.unwrap();
    hub.resolver.scan().await.unwrap();
    assert_unique_keys(&hub.resolver);
    assert_eq!(hub.resolver.inventory().len(), 1);

    first.stop().await;
    hub.resolver.scan().await.unwrap();
    assert_unique_keys(&hub.resolver);

    let first = EchoService::start(dir.path(), "echo-a", &[AuthType::Service]).await.unwrap();
    hub.resolver.scan().await.unwrap();
    hub.resolver.scan().await.unwrap();
    assert_unique_keys(&hub.resolver);
    assert_eq!(hub.resolver.inventory().len(), 1);

    // the key is always served by exactly one of the two
    let reply = echo(&hub.client, "x").await.unwrap();
    assert_eq!(reply, "x");
    assert_eq!(first.calls() + second.calls(), 1);
    first.stop().await;
    second.stop().await;
}

fn assert_unique_keys(resolver: &CapResolver) {
    let inventory = resolver.inventory();
    let mut seen = HashSet::new();
    for cap in inventory.list_all() {
        assert!(seen.insert(cap.key()), "duplicate key {}", cap.key());
    }
    assert_eq!(seen.len(), inventory.len());
}
