//! End-to-end tests for the Qase tool gateway.
//!
//! These tests drive the real reqwest sender against a wiremock server that
//! stands in for the Qase v1 and v2 APIs, and check the HTTP traffic each
//! tool invocation produces.
//!
//! Scenarios:
//! 1. create a test case
//! 2. list test cases across three pages
//! 3. bulk-create 250 cases with the second chunk failing
//! 4. 4xx responses surface without retry
//! 5. 429 responses are retried after `Retry-After`
//! 6. reference data is served from the cache
//! 7. attachment upload sends multipart
//! 8. v2 bulk results

use qase_mcp::{GatewayConfig, RetryPolicy, ToolEnvelope, ToolGateway, ToolInvocation};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "test-qase-token";

/// Test fixture providing a mock Qase server and a gateway pointed at it.
struct TestFixture {
    /// Mock Qase server serving `/v1` and `/v2`.
    server: MockServer,
    /// Gateway under test.
    gateway: ToolGateway,
}

impl TestFixture {
    /// Create a new fixture.
    async fn new() -> Self {
        let server = MockServer::start().await;

        let mut config = GatewayConfig::new(TOKEN);
        config.endpoints.v1 = format!("{}/v1", server.uri());
        config.endpoints.v2 = format!("{}/v2", server.uri());
        config.timeout_secs = 10;
        config.rate_limit.per_minute = 6000;
        config.rate_limit.burst = 100;
        config.retry = RetryPolicy::fast();

        let gateway = ToolGateway::new(config).expect("gateway config is valid");
        Self { server, gateway }
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Value {
        self.gateway
            .invoke_envelope(ToolInvocation::new(tool, arguments))
            .await
            .to_value()
    }
}

fn qase_ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": true, "result": result}))
}

/// Matches a bulk chunk whose first case has the given title.
struct ChunkStartsWith(&'static str);

impl Match for ChunkStartsWith {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .map(|body| body["cases"][0]["title"] == self.0)
            .unwrap_or(false)
    }
}

/// Matches a multipart body carrying the given file part.
struct MultipartFile {
    file_name: &'static str,
    content: &'static str,
}

impl Match for MultipartFile {
    fn matches(&self, request: &Request) -> bool {
        let body = String::from_utf8_lossy(&request.body);
        body.contains(&format!("name=\"file\"; filename=\"{}\"", self.file_name))
            && body.contains(self.content)
    }
}

fn entities(range: std::ops::Range<u64>) -> Vec<Value> {
    range.map(|id| json!({"id": id, "title": format!("case {}", id)})).collect()
}

// =============================================================================
// Test 1: create a test case
// =============================================================================

#[tokio::test]
async fn test_create_test_case() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/v1/case/DEMO"))
        .and(header("Token", TOKEN))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({"title": "Login works"})))
        .respond_with(qase_ok(json!({"id": 42})))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let value = fixture
        .invoke(
            "qase_create_test_case",
            json!({"project_code": "DEMO", "title": "Login works"}),
        )
        .await;

    assert_eq!(value, json!({"toolResult": {"id": 42}}));
}

// =============================================================================
// Test 2: three-page list
// =============================================================================

#[tokio::test]
async fn test_list_test_cases_across_pages() {
    let fixture = TestFixture::new().await;

    for (offset, range) in [("0", 0..100), ("100", 100..200), ("200", 200..250)] {
        Mock::given(method("GET"))
            .and(path("/v1/case/DEMO"))
            .and(query_param("limit", "100"))
            .and(query_param("offset", offset))
            .and(query_param("filters[search]", "login"))
            .and(query_param("filters[priority]", "high,medium"))
            .respond_with(qase_ok(json!({
                "total": 250,
                "filtered": 250,
                "count": range.end - range.start,
                "entities": entities(range),
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;
    }

    let value = fixture
        .invoke(
            "qase_list_test_cases",
            json!({"project_code": "DEMO", "search": "login", "priority": "high,medium"}),
        )
        .await;

    let result = &value["toolResult"];
    assert_eq!(result["total"], 250);
    assert_eq!(result["count"], 250);
    let ids: Vec<u64> = result["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, (0..250).collect::<Vec<_>>());
}

// =============================================================================
// Test 3: bulk create with a failing chunk
// =============================================================================

#[tokio::test]
async fn test_bulk_create_with_failing_second_chunk() {
    let fixture = TestFixture::new().await;

    // Chunks are retried once, so the failing chunk is seen twice.
    Mock::given(method("POST"))
        .and(path("/v1/case/DEMO/bulk"))
        .and(ChunkStartsWith("case 100"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"status": false, "errorMessage": "Internal error"})),
        )
        .expect(2)
        .mount(&fixture.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/case/DEMO/bulk"))
        .and(header("Token", TOKEN))
        .respond_with(|request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            let ids: Vec<Value> = body["cases"]
                .as_array()
                .map(|cases| cases.iter().map(|case| case["n"].clone()).collect())
                .unwrap_or_default();
            qase_ok(json!({"ids": ids}))
        })
        .expect(2)
        .mount(&fixture.server)
        .await;

    let cases: Vec<Value> = (0..250)
        .map(|n| json!({"title": format!("case {}", n), "n": n}))
        .collect();
    let value = fixture
        .invoke(
            "qase_create_bulk_test_cases",
            json!({"project_code": "DEMO", "cases": cases}),
        )
        .await;

    let error = &value["error"];
    assert_eq!(error["kind"], "partial_bulk_failure");

    let failed: Vec<u64> = error["failedItems"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| {
            assert_eq!(item["kind"], "upstream_server_error");
            item["index"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(failed, (100..200).collect::<Vec<_>>());

    let items = error["report"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 250);
    assert_eq!(items[0]["status"], "succeeded");
    assert_eq!(items[0]["result"], json!({"id": 0}));
    assert_eq!(items[249]["result"], json!({"id": 249}));
    assert_eq!(items[150]["status"], "failed");
    assert_eq!(error["report"]["succeeded"], 150);
}

// =============================================================================
// Test 4: client errors are not retried
// =============================================================================

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/v1/case/DEMO/999"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"status": false, "errorMessage": "TestCase not found"})),
        )
        .expect(1)
        .mount(&fixture.server)
        .await;

    let value = fixture
        .invoke("qase_get_test_case", json!({"project_code": "DEMO", "case_id": 999}))
        .await;

    assert_eq!(value["error"]["kind"], "upstream_client_error");
    assert_eq!(value["error"]["status"], 404);
    assert!(value["error"]["message"]
        .as_str()
        .unwrap()
        .contains("TestCase not found"));
}

#[tokio::test]
async fn test_validation_error_sends_nothing() {
    let fixture = TestFixture::new().await;

    let value = fixture
        .invoke(
            "qase_create_test_result",
            json!({"project_code": "DEMO", "run_id": 1, "case_id": 2, "status": "maybe"}),
        )
        .await;

    assert_eq!(value["error"]["kind"], "validation_error");
    assert_eq!(value["error"]["field"], "status");
    assert!(fixture.server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Test 5: 429 handling
// =============================================================================

#[tokio::test]
async fn test_rate_limited_request_retried_after_header() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/v1/project/DEMO"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&fixture.server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/project/DEMO"))
        .respond_with(qase_ok(json!({"code": "DEMO", "title": "Demo"})))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let start = Instant::now();
    let value = fixture
        .invoke("qase_get_project", json!({"project_code": "DEMO"}))
        .await;

    assert_eq!(value["toolResult"]["code"], "DEMO");
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(fixture.gateway.metrics().rate_limited_responses, 1);
}

// =============================================================================
// Test 6: reference-data cache
// =============================================================================

#[tokio::test]
async fn test_custom_fields_fetched_once() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/v1/custom_field/DEMO"))
        .respond_with(qase_ok(json!({
            "total": 2,
            "entities": [{"id": 1, "title": "Component"}, {"id": 2, "title": "Layer"}],
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    for _ in 0..3 {
        let value = fixture
            .invoke("qase_list_custom_fields", json!({"project_code": "DEMO"}))
            .await;
        assert_eq!(value["toolResult"]["count"], 2);
    }

    let metrics = fixture.gateway.metrics();
    assert_eq!(metrics.cache_hits, 2);
    assert_eq!(metrics.cache_misses, 1);
}

// =============================================================================
// Test 7: attachment upload
// =============================================================================

#[tokio::test]
async fn test_upload_attachment_is_multipart() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/v1/attachment/DEMO"))
        .and(header("Token", TOKEN))
        .and(MultipartFile {
            file_name: "log.txt",
            content: "hello qase",
        })
        .respond_with(qase_ok(json!([{"hash": "abc123", "filename": "log.txt"}])))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let value = fixture
        .invoke(
            "qase_upload_attachment",
            json!({
                "project_code": "DEMO",
                "file_name": "log.txt",
                "content_base64": "aGVsbG8gcWFzZQ==",
                "mime_type": "text/plain",
            }),
        )
        .await;

    assert_eq!(value["toolResult"][0]["hash"], "abc123");
}

// =============================================================================
// Test 8: v2 bulk results
// =============================================================================

#[tokio::test]
async fn test_create_results_v2() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/v2/DEMO/run/7/results"))
        .and(header("Token", TOKEN))
        .and(body_json(json!({
            "results": [{"title": "Login", "execution": {"status": "passed"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true})))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let envelope = fixture
        .gateway
        .invoke_envelope(ToolInvocation::new(
            "qase_create_results_v2",
            json!({
                "project_code": "DEMO",
                "run_id": 7,
                "results": [{"title": "Login", "execution": {"status": "passed"}}],
            }),
        ))
        .await;

    match envelope {
        ToolEnvelope::ToolResult(result) => {
            assert_eq!(result["succeeded"], 1);
            assert_eq!(result["failed"], 0);
        }
        ToolEnvelope::Error(body) => panic!("unexpected error: {:?}", body),
    }
    assert_eq!(fixture.gateway.metrics().v2_requests, 1);
}

#[tokio::test]
async fn test_catalog_and_health() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/v1/project"))
        .and(query_param("limit", "1"))
        .and(header("Token", TOKEN))
        .respond_with(qase_ok(json!({"total": 1, "entities": [{"code": "DEMO"}]})))
        .expect(2)
        .mount(&fixture.server)
        .await;

    let catalog = fixture.gateway.catalog();
    assert!(catalog.iter().any(|tool| tool.name == "qase_upload_attachment"));
    assert!(catalog.iter().all(|tool| tool.name.starts_with("qase_")));

    let checker = fixture.gateway.health_checker();
    assert!(checker.check_liveness().await.alive);
    assert!(checker.check_readiness().await.ready);
    let report = checker.check_all().await;
    assert_eq!(report.status, qase_mcp::HealthStatus::Healthy);
}
