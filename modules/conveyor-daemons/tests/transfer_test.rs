//! Transfer daemon reconciliation against mock Buckets and Results
//! backends.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conveyor_client::{Buckets, ClientConfig, Results};
use conveyor_daemons::transfer;
use conveyor_common::Workspace;

const CUTOFF: Duration = Duration::from_secs(60 * 60 * 24 * 7);

fn workspace(results_allowed: bool) -> Workspace {
    let raw = format!(
        "workspace: testing\nsites: [local]\nconfig:\n  archive:\n    results: {results_allowed}\n"
    );
    Workspace::from_yaml(&raw).unwrap()
}

fn buckets(server: &MockServer) -> Buckets {
    Buckets::new(&ClientConfig::new(server.uri()).with_timeout(5.0)).unwrap()
}

fn results(server: &MockServer) -> Results {
    Results::new(&ClientConfig::new(server.uri()).with_timeout(5.0)).unwrap()
}

/// Mount the three partition queries: successful work S0 (results archival
/// off) and S1 (on), no exhausted failures, no stale work.
async fn mount_partition_views(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"status": "success"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "S0", "config": {"archive": {"results": false}}},
            {"id": "S1", "config": {"archive": {"results": true}}},
        ])))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"status": "failure"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"id": {"$in": ["S1"]}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "S1", "pipeline": "demo", "status": "success"},
        ])))
        .with_priority(1)
        .mount(server)
        .await;
    // Stale sweep and anything else: empty.
    Mock::given(method("POST"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn partitions_by_archive_policy_and_deletes_both() {
    let server = MockServer::start().await;
    mount_partition_views(&server).await;
    Mock::given(method("POST"))
        .and(path("/deposit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/work"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = transfer::tick(
        &buckets(&server),
        &results(&server),
        &workspace(true),
        50,
        CUTOFF,
    )
    .await
    .unwrap();

    assert_eq!(outcome.transfered, 1);
    assert_eq!(outcome.deleted, 2);

    // S0 was purged without ever touching Results; S1 went through deposit.
    let requests = server.received_requests().await.unwrap();
    let delete = requests
        .iter()
        .find(|request| request.method.as_str() == "DELETE")
        .unwrap();
    let query = delete.url.query().unwrap();
    assert!(query.contains("ids=S0"));
    assert!(query.contains("ids=S1"));
}

#[tokio::test]
async fn workspace_veto_purges_instead_of_transferring() {
    let server = MockServer::start().await;
    mount_partition_views(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/work"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = transfer::tick(
        &buckets(&server),
        &results(&server),
        &workspace(false),
        50,
        CUTOFF,
    )
    .await
    .unwrap();

    assert_eq!(outcome.transfered, 0);
    assert_eq!(outcome.deleted, 2);
    // Results was never asked to deposit anything.
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|request| request.url.path() != "/deposit"));
}

#[tokio::test]
async fn failed_deposit_falls_back_to_per_id_check() {
    let server = MockServer::start().await;
    mount_partition_views(&server).await;
    // First deposit is rejected outright; existence check says missing;
    // the redeposit of the missing subset succeeds.
    Mock::given(method("POST"))
        .and(path("/deposit"))
        .respond_with(ResponseTemplate::new(422))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/deposit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/work"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = transfer::tick(
        &buckets(&server),
        &results(&server),
        &workspace(true),
        50,
        CUTOFF,
    )
    .await
    .unwrap();

    assert_eq!(outcome.transfered, 1);
    assert_eq!(outcome.deleted, 2);
}

#[tokio::test]
async fn already_present_rows_are_only_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"status": "success"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "S1", "config": {"archive": {"results": true}}},
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"id": {"$in": ["S1"]}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "S1", "pipeline": "demo", "status": "success"},
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    // Existence probe: the row is already in Results.
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"pipeline": "demo", "id": "S1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "S1"}])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/deposit"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/work"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = transfer::tick(
        &buckets(&server),
        &results(&server),
        &workspace(true),
        50,
        CUTOFF,
    )
    .await
    .unwrap();

    // Confirmed present, so it is safe to delete; nothing new transferred.
    assert_eq!(outcome.transfered, 0);
    assert_eq!(outcome.deleted, 1);
}

#[tokio::test]
async fn unconfirmed_rows_stay_in_buckets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"status": "success"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "S1", "config": {"archive": {"results": true}}},
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_partial_json(json!({"query": {"id": {"$in": ["S1"]}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "S1", "pipeline": "demo", "status": "success"},
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    // Every deposit attempt is rejected: the row is never durable in
    // Results, so it must never be deleted from Buckets.
    Mock::given(method("POST"))
        .and(path("/deposit"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let outcome = transfer::tick(
        &buckets(&server),
        &results(&server),
        &workspace(true),
        50,
        CUTOFF,
    )
    .await
    .unwrap();

    assert_eq!(outcome.transfered, 0);
    assert_eq!(outcome.deleted, 0);
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|request| request.method.as_str() != "DELETE"));
}
