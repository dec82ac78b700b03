//! Echo service used by the end-to-end tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hiveot_kernel::{AuthType, HubError, HubResult};
use hiveot_rpc::{MethodDescriptor, ServerBuilder};
use hiveot_runtime::transport::listen_uds;
use hiveot_runtime::CapProvider;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ECHO_INTERFACE_ID: u64 = 0xec40_7e57;

/// `Echo(String) -> String`
pub const ECHO: MethodDescriptor = MethodDescriptor::new(ECHO_INTERFACE_ID, 0, "EchoService", "Echo");

/// A running echo service. Stopping it removes its socket.
pub struct EchoService {
    pub service_id: String,
    calls: Arc<AtomicUsize>,
    stop: CancellationToken,
    task: JoinHandle<HubResult<()>>,
}

impl EchoService {
    /// Serve `Echo` on `<run_dir>/<service_id>.socket`, exported to `roles`.
    pub async fn start(run_dir: &Path, service_id: &str, roles: &[AuthType]) -> HubResult<Self> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let builder = ServerBuilder::new(service_id).typed(&ECHO, move |text: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, HubError>(text) }
        });
        let provider = CapProvider::new(service_id, builder);
        provider.export_capability(ECHO.method_name, roles.iter().copied())?;

        let listener = listen_uds(&run_dir.join(format!("{service_id}.socket"))).await?;
        let stop = CancellationToken::new();
        let token = stop.clone();
        let task = tokio::spawn(async move { provider.start(listener, token).await });
        Ok(Self {
            service_id: service_id.to_string(),
            calls,
            stop,
            task,
        })
    }

    /// Calls the service has answered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}
