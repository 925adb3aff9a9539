#![allow(clippy::unwrap_used)]
// Integration tests for `PlcClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use plcsync_api::{
    Credentials, Error, PlcClient, TagAddress, TagWrite, Throttle, TransportConfig,
};

const PLC: &str = "10.0.0.1";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, PlcClient) {
    let server = MockServer::start().await;
    let client = client_for(&server.uri());
    (server, client)
}

fn client_for(uri: &str) -> PlcClient {
    let transport = TransportConfig::with_timeout(Duration::from_secs(5));
    PlcClient::new(
        Url::parse(uri).unwrap(),
        PLC,
        Credentials::new("operador", "s3cret".to_string().into()),
        &transport,
    )
    .unwrap()
    .with_known_bad_hosts(vec!["automacao.tce.go.br".into()])
    .with_throttle(Throttle::new(Duration::ZERO))
}

fn tag(raw: &str) -> TagAddress {
    raw.parse().unwrap()
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_uses_double_encoded_tag_and_basic_auth() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/tag_read/10.0.0.1/N33%253A0"))
        .and(basic_auth("operador", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "valor": 25 })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.read(&tag("N33:0")).await.unwrap(), 25);
}

#[tokio::test]
async fn test_read_unauthorized_is_auth_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.read(&tag("N33:0")).await.unwrap_err();
    assert!(err.is_auth(), "expected auth error, got: {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_read_without_valor_is_protocol_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "erro": "tag" })))
        .mount(&server)
        .await;

    let err = client.read(&tag("N33:0")).await.unwrap_err();
    assert!(
        matches!(err, Error::Deserialization { .. }),
        "expected Deserialization, got: {err:?}"
    );
    assert!(err.is_protocol());
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = client_for(&uri);
    let err = client.probe(&tag("N33:0")).await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}

// ── Single writes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_write_rejected_when_sucesso_false() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/tag_write/10.0.0.1/N60%253A3/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sucesso": false })))
        .mount(&server)
        .await;

    let result = client.write(&TagWrite::new(tag("N60:3"), 12)).await;
    assert!(
        matches!(result, Err(Error::Rejected { ref address }) if address == "N60:3"),
        "expected Rejected, got: {result:?}"
    );
}

// ── Batch writes ────────────────────────────────────────────────────

#[tokio::test]
async fn test_write_batch_sends_all_operations_in_one_request() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tag_write_batch"))
        .and(basic_auth("operador", "s3cret"))
        .and(body_json(json!({
            "clp_address": PLC,
            "operations": [
                { "tag_address": "N33:0", "value": "25" },
                { "tag_address": "N34:0", "value": "12" },
                { "tag_address": "N33:1", "value": "0" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "summary": { "total": 3, "successful": 3, "failed": 0 },
            "results": {
                "N33:0": { "success": true },
                "N34:0": { "success": true },
                "N33:1": { "success": true }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ops = vec![
        TagWrite::new(tag("N33:0"), 25),
        TagWrite::new(tag("N34:0"), 12),
        TagWrite::new(tag("N33:1"), 0),
    ];
    let outcome = client.write_batch(&ops).await.unwrap();
    assert_eq!(outcome.total, 3);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_write_batch_partial_failure_is_collected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tag_write_batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "summary": { "total": 2, "successful": 1, "failed": 1 },
            "results": {
                "N60:0": { "success": true },
                "N61:0": { "success": false, "error": "tag locked" }
            }
        })))
        .mount(&server)
        .await;

    let ops = vec![
        TagWrite::new(tag("N60:0"), 7),
        TagWrite::new(tag("N61:0"), 3),
    ];
    let outcome = client.write_batch(&ops).await.unwrap();
    assert_eq!(outcome.successful, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].address, tag("N61:0"));
}

#[tokio::test]
async fn test_write_batch_missing_endpoint_allows_fallback() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tag_write_batch"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let err = client
        .write_batch(&[TagWrite::new(tag("N33:0"), 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Status { status: 404, .. }));
    assert!(err.is_batch_unavailable());
}

// ── Sequential writes ───────────────────────────────────────────────

#[tokio::test]
async fn test_write_sequential_records_failures_and_continues() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/tag_write/10.0.0.1/N60%253A1/9"))
        .respond_with(ResponseTemplate::new(500).set_body_string("driver fault"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sucesso": true })))
        .mount(&server)
        .await;

    let ops = vec![
        TagWrite::new(tag("N60:0"), 8),
        TagWrite::new(tag("N60:1"), 9),
        TagWrite::new(tag("N60:2"), 10),
    ];
    let outcome = client.write_sequential(&ops).await.unwrap();

    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.successful, 2);
    assert_eq!(outcome.failures[0].address, tag("N60:1"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_write_sequential_aborts_on_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let ops = vec![
        TagWrite::new(tag("N60:0"), 8),
        TagWrite::new(tag("N60:1"), 9),
    ];
    let err = client.write_sequential(&ops).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { status: 403 }));
}

#[tokio::test]
async fn test_write_sequential_stops_at_foreign_redirect() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "https://sso.example.com/login"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ops: Vec<TagWrite> = (0..5)
        .map(|i| TagWrite::new(tag(&format!("N60:{i}")), 1))
        .collect();
    let err = client.write_sequential(&ops).await.unwrap_err();

    assert!(err.is_protocol(), "expected protocol error, got: {err:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// ── Redirects ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_redirect_to_misspelled_host_is_retried_once() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/tag_read/10.0.0.1/N91%253A0"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "http://automacao.tce.go.br/tag_read/10.0.0.1/N91%253A0",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tag_read/10.0.0.1/N91%253A0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "valor": 4 })))
        .mount(&server)
        .await;

    assert_eq!(client.read(&tag("N91:0")).await.unwrap(), 4);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_redirect_loop_gives_up_after_one_retry() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            "http://automacao.tce.go.br/tag_read/10.0.0.1/N91%253A0",
        ))
        .expect(2)
        .mount(&server)
        .await;

    let err = client.read(&tag("N91:0")).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedRedirect { .. }));
}

#[tokio::test]
async fn test_redirect_to_foreign_host_is_protocol_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "https://sso.example.com/login"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client.read(&tag("N33:0")).await.unwrap_err();
    assert!(
        matches!(err, Error::UnexpectedRedirect { ref location } if location.contains("sso.example.com")),
        "expected UnexpectedRedirect, got: {err:?}"
    );
    assert!(err.is_protocol());
}

#[tokio::test]
async fn test_batch_redirect_replays_post_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tag_write_batch"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Location", "http://automacao.tce.go.br/tag_write_batch"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tag_write_batch"))
        .and(body_json(json!({
            "clp_address": PLC,
            "operations": [{ "tag_address": "N33:0", "value": "0" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .write_batch(&[TagWrite::new(tag("N33:0"), 0)])
        .await
        .unwrap();
    assert!(outcome.is_complete());
}
