//! Gateway sessions over TLS and WSS against a full test hub.

use std::time::Duration;

use hiveot_authn::{SessionAuth, TokenSubject, TokenVerifier};
use hiveot_gateway::GatewayClient;
use hiveot_kernel::{AuthType, CertRole, HubError};
use hiveot_testing::{eventually, TestHub, ECHO, TEST_USER, TEST_USER_PASSWORD};

async fn wait_for_capability(hub: &TestHub, service_id: &str) {
    let resolver = hub.resolver_client().await.unwrap();
    let found = eventually(Duration::from_secs(2), || {
        let resolver = resolver.clone();
        let service_id = service_id.to_string();
        async move { resolver.find_capability(&service_id, "Echo").await.ok() }
    })
    .await;
    assert!(found.is_some(), "{service_id} not discovered");
}

#[tokio::test]
async fn device_session_cannot_reach_user_methods() {
    let hub = TestHub::start().await.unwrap();
    let echo = hub.start_echo("echo", &[AuthType::User]).await.unwrap();
    wait_for_capability(&hub, "echo").await;
    let gateway = hub.start_gateway().await.unwrap();

    let cert = hub.client_cert("thermostat1", CertRole::IoTDevice).unwrap();
    let device = GatewayClient::connect(&gateway.url, &hub.dial_options(Some(cert))).await.unwrap();
    let info = device.ping().await.unwrap();
    assert_eq!(info.client_id, "thermostat1");
    assert_eq!(info.auth_type, AuthType::IoTDevice);

    assert!(!device.list_capabilities().await.unwrap().iter().any(|c| c.service_id == "echo"));
    let err = device.client().invoke::<_, String>(&ECHO, "hi").await.unwrap_err();
    assert!(matches!(err, HubError::Forbidden(_)), "{err}");
    let err = device.get_capability("echo", "Echo").await.unwrap_err();
    assert!(matches!(err, HubError::Forbidden(_)), "{err}");
    assert_eq!(echo.calls(), 0);

    let cert = hub.client_cert("bob", CertRole::User).unwrap();
    let user = GatewayClient::connect(&gateway.url, &hub.dial_options(Some(cert))).await.unwrap();
    assert_eq!(user.ping().await.unwrap().auth_type, AuthType::User);
    let reply: String = user.client().invoke(&ECHO, "hi").await.unwrap();
    assert_eq!(reply, "hi");
    assert_eq!(echo.calls(), 1);
}

#[tokio::test]
async fn login_and_refresh_issue_verifiable_tokens() {
    let hub = TestHub::start().await.unwrap();
    let gateway = hub.start_gateway().await.unwrap();
    let client = GatewayClient::connect(&gateway.url, &hub.dial_options(None)).await.unwrap();
    assert_eq!(client.ping().await.unwrap().auth_type, AuthType::Unauthenticated);

    let err = client.login(TEST_USER, "wrong").await.unwrap_err();
    assert!(matches!(err, HubError::Unauthorized(_)), "{err}");
    assert_eq!(client.ping().await.unwrap().auth_type, AuthType::Unauthenticated);

    let first = client.login(TEST_USER, TEST_USER_PASSWORD).await.unwrap();
    let second = client.refresh(TEST_USER, &first.refresh_token).await.unwrap();
    assert_ne!(first.access_token, second.access_token);
    assert_ne!(first.refresh_token, second.refresh_token);
    let err = client.refresh(TEST_USER, "garbage").await.unwrap_err();
    assert!(matches!(err, HubError::Unauthorized(_)), "{err}");

    let info = client.ping().await.unwrap();
    assert_eq!(info.client_id, TEST_USER);
    assert_eq!(info.auth_type, AuthType::User);

    // tokens verify under the gateway key only
    let auth = gateway.service.auth();
    let claims = auth.verifier().verify(&second.access_token, TokenSubject::Access).unwrap();
    assert_eq!(claims.client_id, TEST_USER);
    auth.verifier().verify(&second.refresh_token, TokenSubject::Refresh).unwrap();
    let other = SessionAuth::generate("test-hub").unwrap();
    let foreign = TokenVerifier::from_public_key_pem("test-hub", other.public_key_pem()).unwrap();
    assert!(foreign.verify(&second.access_token, TokenSubject::Access).is_err());
    assert!(foreign.verify(&second.refresh_token, TokenSubject::Refresh).is_err());

    // refresh token carrying the claims of another token
    let refresh: Vec<&str> = second.refresh_token.split('.').collect();
    let access: Vec<&str> = second.access_token.split('.').collect();
    let spliced = format!("{}.{}.{}", refresh[0], access[1], refresh[2]);
    let err = client.refresh(TEST_USER, &spliced).await.unwrap_err();
    assert!(matches!(err, HubError::Unauthorized(_)), "{err}");

    // a second session takes over the identity with the access token
    let other_client = GatewayClient::connect(&gateway.url, &hub.dial_options(None)).await.unwrap();
    let info = other_client.authenticate(TEST_USER, &second.access_token).await.unwrap();
    assert_eq!(info.auth_type, AuthType::User);
}

#[tokio::test]
async fn closing_the_connection_revokes_its_handles() {
    let hub = TestHub::start().await.unwrap();
    let echo = hub.start_echo("echo", &[AuthType::User]).await.unwrap();
    wait_for_capability(&hub, "echo").await;
    let gateway = hub.start_gateway().await.unwrap();

    let client = GatewayClient::connect(&gateway.url, &hub.dial_options(None)).await.unwrap();
    client.login(TEST_USER, TEST_USER_PASSWORD).await.unwrap();
    let handle = client.get_capability("echo", "Echo").await.unwrap();
    let spare = client.get_capability("echo", "Echo").await.unwrap();
    let reply: String = handle.invoke(&ECHO, "one").await.unwrap();
    assert_eq!(reply, "one");
    let open = gateway.service.clone();
    assert!(eventually(Duration::from_secs(1), || {
        let open = open.clone();
        async move { (open.session_count() == 1).then_some(()) }
    })
    .await
    .is_some());

    // another task keeps using the handle while the connection goes away
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
    let user = tokio::spawn(async move {
        ready_rx.await.unwrap();
        tokio::time::timeout(Duration::from_millis(200), handle.invoke::<_, String>(&ECHO, "two")).await
    });
    client.close();
    ready_tx.send(()).unwrap();
    let err = user.await.unwrap().expect("call did not fail within 200ms").unwrap_err();
    assert!(err.is_transport(), "expected Transport, got {err}");
    let err = spare.invoke::<_, String>(&ECHO, "three").await.unwrap_err();
    assert!(err.is_transport(), "expected Transport, got {err}");
    assert_eq!(echo.calls(), 1);

    let open = gateway.service.clone();
    assert!(eventually(Duration::from_secs(1), || {
        let open = open.clone();
        async move { (open.session_count() == 0).then_some(()) }
    })
    .await
    .is_some());
}

#[tokio::test]
async fn websocket_sessions_reach_services() {
    let hub = TestHub::start().await.unwrap();
    let echo = hub.start_echo("echo", &[AuthType::User, AuthType::Service]).await.unwrap();
    wait_for_capability(&hub, "echo").await;
    let gateway = hub.start_gateway().await.unwrap();
    assert!(gateway.wss_url.starts_with("wss://127.0.0.1:"));

    let client = GatewayClient::connect(&gateway.wss_url, &hub.dial_options(None)).await.unwrap();
    let caps = client.list_capabilities().await.unwrap();
    assert!(caps.iter().all(|c| c.admits(AuthType::Unauthenticated)));

    client.login(TEST_USER, TEST_USER_PASSWORD).await.unwrap();
    let caps = client.list_capabilities().await.unwrap();
    assert!(caps.iter().any(|c| c.service_id == "echo" && c.method_name == "Echo"));
    let handle = client.get_capability("echo", "Echo").await.unwrap();
    let reply: String = handle.invoke(&ECHO, "over ws").await.unwrap();
    assert_eq!(reply, "over ws");
    assert_eq!(echo.calls(), 1);
    assert_eq!(gateway.service.sessions()[0].client_id, TEST_USER);
}
