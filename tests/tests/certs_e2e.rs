//! Certificate issuing through the certs service, reached via the resolver.

use std::time::Duration;

use hiveot_certs::CertsClient;
use hiveot_kernel::{AuthType, CertRole, HubError};
use hiveot_runtime::transport::cert_summary_pem;
use hiveot_testing::{eventually, TestHub};
use rcgen::KeyPair;

async fn certs_client(hub: &TestHub) -> CertsClient {
    let resolver = hub.resolver_client().await.unwrap();
    let found = eventually(Duration::from_secs(2), || {
        let resolver = resolver.clone();
        async move { resolver.find_capability(hiveot_certs::SERVICE_ID, "CapServiceCerts").await.ok() }
    })
    .await;
    assert!(found.is_some(), "certs service not discovered");
    CertsClient::new(resolver.client().clone())
}

#[tokio::test]
async fn service_cert_verifies_for_its_own_id_only() {
    let hub = TestHub::start().await.unwrap();
    let certs = certs_client(&hub).await;

    let key = KeyPair::generate().unwrap();
    let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    let issued = certs
        .cap_service_certs()
        .await
        .unwrap()
        .create_service_cert("srv1", &key.public_key_pem(), &names, 30)
        .await
        .unwrap();
    assert_eq!(issued.ca_cert_pem, hub.issuer().ca_cert_pem());

    let verify = certs.cap_verify_certs().await.unwrap();
    verify.verify_cert("srv1", &issued.cert_pem).await.unwrap();
    let err = verify.verify_cert("other", &issued.cert_pem).await.unwrap_err();
    assert!(matches!(err, HubError::Unauthorized(_)), "{err}");
}

#[tokio::test]
async fn every_role_round_trips_through_verify() {
    let hub = TestHub::start().await.unwrap();
    let certs = certs_client(&hub).await;
    let verify = certs.cap_verify_certs().await.unwrap();
    let devices = certs.cap_device_certs().await.unwrap();
    let services = certs.cap_service_certs().await.unwrap();
    let users = certs.cap_user_certs().await.unwrap();

    for (i, days) in [1u32, 30, 365, 3650].into_iter().enumerate() {
        for role in [CertRole::IoTDevice, CertRole::Service, CertRole::User] {
            let id = format!("{role}-{i}");
            let pub_key = KeyPair::generate().unwrap().public_key_pem();
            let issued = match role {
                CertRole::IoTDevice => devices.create_device_cert(&id, &pub_key, days).await,
                CertRole::Service => services.create_service_cert(&id, &pub_key, &[], days).await,
                CertRole::User => users.create_user_cert(&id, &pub_key, days).await,
            }
            .unwrap();

            let summary = cert_summary_pem(&issued.cert_pem).unwrap();
            assert_eq!(summary.role(), Some(role));
            assert_eq!((summary.not_after - summary.not_before) / 86_400, i64::from(days));
            assert!(verify.verify_cert(&id, &issued.cert_pem).await.is_ok(), "{id}");
            assert!(verify.verify_cert(&format!("{id}-x"), &issued.cert_pem).await.is_err(), "{id}");
        }
    }
}

#[tokio::test]
async fn certs_capabilities_are_exported_to_services() {
    let hub = TestHub::start().await.unwrap();
    let _ = certs_client(&hub).await;
    let resolver = hub.resolver_client().await.unwrap();

    let for_services = resolver.list_capabilities(AuthType::Service).await.unwrap();
    let names: Vec<_> = for_services
        .iter()
        .filter(|c| c.service_id == hiveot_certs::SERVICE_ID)
        .map(|c| c.method_name.as_str())
        .collect();
    assert_eq!(names, vec!["CapDeviceCerts", "CapServiceCerts", "CapUserCerts", "CapVerifyCerts"]);

    let for_devices = resolver.list_capabilities(AuthType::IoTDevice).await.unwrap();
    let names: Vec<_> = for_devices
        .iter()
        .filter(|c| c.service_id == hiveot_certs::SERVICE_ID)
        .map(|c| c.method_name.as_str())
        .collect();
    assert_eq!(names, vec!["CapVerifyCerts"]);
}
