//! Audit daemon tick against a mock Buckets backend.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conveyor_client::{Buckets, ClientConfig};
use conveyor_daemons::audit;

async fn mount_sweeps(server: &MockServer, failed: u64, expired: u64, stale: u64) {
    for (route, count) in [
        ("/audit/failed", failed),
        ("/audit/expired", expired),
        ("/audit/stale/7.0", stale),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(count))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn tick_returns_the_sweep_counts() {
    let server = MockServer::start().await;
    mount_sweeps(&server, 1, 0, 0).await;

    let buckets = Buckets::new(&ClientConfig::new(server.uri()).with_timeout(5.0)).unwrap();
    let counts = audit::tick(&buckets).await.unwrap();

    assert_eq!(counts.failed, 1);
    assert_eq!(counts.expired, 0);
    assert_eq!(counts.stale, 0);
}

#[tokio::test]
async fn tick_surfaces_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audit/failed"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let buckets = Buckets::new(&ClientConfig::new(server.uri()).with_timeout(5.0)).unwrap();
    assert!(audit::tick(&buckets).await.is_err());
}
