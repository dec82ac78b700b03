//! HiveOT testing fixtures
//!
//! Provides a temporary hub ([`TestHub`]) with its own CA, run directory,
//! certs service, resolver and optional gateway, plus a small echo service
//! to exercise discovery, forwarding and role filtering end to end.

pub mod echo;
pub mod hub;

pub use echo::{EchoService, ECHO, ECHO_INTERFACE_ID};
pub use hub::{TestGateway, TestHub, TEST_USER, TEST_USER_PASSWORD};

use std::future::Future;
use std::time::Duration;

/// Poll `probe` until it yields `Some` or `timeout` expires.
pub async fn eventually<T, F, Fut>(timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
