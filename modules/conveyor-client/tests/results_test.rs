//! Integration tests for the Results client against a mock backend.

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conveyor_client::{ClientConfig, Results};

fn client(server: &MockServer) -> Results {
    Results::new(&ClientConfig::new(server.uri()).with_timeout(5.0)).unwrap()
}

#[tokio::test]
async fn deposit_posts_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deposit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;

    let deposited = client(&server)
        .deposit(&[json!({"pipeline": "demo", "id": "a1"})])
        .await
        .unwrap();
    assert!(deposited);
}

#[tokio::test]
async fn exists_checks_pipeline_and_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .and(body_json(json!({
            "query": {"pipeline": "demo", "id": "a1"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "a1"}])))
        .mount(&server)
        .await;

    assert!(client(&server).exists("demo", "a1").await.unwrap());
}

#[tokio::test]
async fn missing_row_does_not_exist() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(!client(&server).exists("demo", "gone").await.unwrap());
}

#[tokio::test]
async fn status_returns_counts_by_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"demo": 12})))
        .mount(&server)
        .await;

    let counts = client(&server).status().await.unwrap();
    assert_eq!(counts.get("demo"), Some(&12));
}
