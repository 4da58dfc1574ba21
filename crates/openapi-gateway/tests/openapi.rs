//! Combined-document routes against mock backends.

mod common;

use axum::http::StatusCode;
use common::{KEY, fast_options, get, http_state, service, state_with};
use openapi_gateway::backend::HttpForwarder;
use openapi_gateway::openapi::UNAVAILABLE_EXTENSION;
use openapi_gateway::server::router;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn backend_document(schema: &str, tag: &str) -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": tag, "version": "1" },
        "paths": {
            "/items": {
                "get": {
                    "tags": [tag],
                    "parameters": [{ "name": "limit", "in": "query" }],
                    "responses": { "200": { "description": "ok" } }
                },
                "summary": "collection"
            }
        },
        "components": {
            "schemas": { schema: { "type": "object" } }
        },
        "tags": [{ "name": "shared" }, { "name": tag }]
    })
}

async fn mock_backend(document: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(&server)
        .await;
    server
}

fn operation_params(doc: &Value, path: &str) -> Vec<Value> {
    doc["paths"][path]["get"]["parameters"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[tokio::test]
async fn combined_document_is_503_until_first_build() {
    let a = mock_backend(backend_document("Item", "a")).await;
    let state = http_state(vec![service("serviceA", &a.uri())], TIMEOUT);

    let (status, body) = get(router(state.clone()), "/openapi.json").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SCHEMA_NOT_READY");

    state.rebuild_combined().await.unwrap();
    let (status, _) = get(router(state), "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn same_path_in_two_backends_is_prefixed_per_service() {
    let a = mock_backend(backend_document("Item", "a")).await;
    let b = mock_backend(backend_document("Order", "b")).await;
    let state = http_state(
        vec![service("serviceA", &a.uri()), service("serviceB", &b.uri())],
        TIMEOUT,
    );
    state.rebuild_combined().await.unwrap();

    let (status, doc) = get(router(state), "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);

    let paths = doc["paths"].as_object().unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains_key("/serviceA/items"));
    assert!(paths.contains_key("/serviceB/items"));

    assert!(doc["components"]["schemas"]["Item"].is_object());
    assert!(doc["components"]["schemas"]["Order"].is_object());
    for section in ["responses", "parameters", "requestBodies"] {
        assert!(doc["components"][section].is_object());
    }

    let tags: Vec<&str> = doc["tags"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(tags, vec!["shared", "a", "b"]);

    // no injection in all-services mode by default
    assert_eq!(operation_params(&doc, "/serviceA/items").len(), 1);
    assert!(doc.get(UNAVAILABLE_EXTENSION).is_none());
}

#[tokio::test]
async fn unreachable_backend_does_not_blank_the_others() {
    let a = mock_backend(backend_document("Item", "a")).await;
    let broken = MockServer::start().await;
    Mock::given(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let state = http_state(
        vec![
            service("serviceA", &a.uri()),
            service("down", "http://127.0.0.1:9"),
            service("broken", &broken.uri()),
        ],
        TIMEOUT,
    );
    state.rebuild_combined().await.unwrap();

    let (status, doc) = get(router(state), "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/serviceA/items"].is_object());
    assert_eq!(doc["paths"].as_object().unwrap().len(), 1);
    assert_eq!(doc[UNAVAILABLE_EXTENSION], json!(["down", "broken"]));
}

#[tokio::test]
async fn flaky_backend_is_retried_at_startup() {
    let a = MockServer::start().await;
    Mock::given(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&a)
        .await;
    Mock::given(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_document("Item", "a")))
        .mount(&a)
        .await;

    let state = http_state(vec![service("serviceA", &a.uri())], TIMEOUT);
    state.rebuild_combined().await.unwrap();

    let (_, doc) = get(router(state), "/openapi.json").await;
    assert!(doc["paths"]["/serviceA/items"].is_object());
    assert_eq!(a.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn single_service_document_gets_exactly_one_gateway_parameter() {
    let a = mock_backend(backend_document("Item", "a")).await;
    let descriptor = service("serviceA", &a.uri())
        .with_gateway_api(json!({ "description": "gateway key", "required": true }))
        .with_security(json!([{ "ApiKeyAuth": [] }]))
        .with_security_schemes(json!({ "ApiKeyAuth": { "type": "apiKey", "in": "query", "name": "gateway_key" } }));
    let state = http_state(vec![descriptor], TIMEOUT);

    let (status, doc) = get(router(state.clone()), "/openapi/serviceA").await;
    assert_eq!(status, StatusCode::OK);

    let params = operation_params(&doc, "/serviceA/items");
    let gateway: Vec<&Value> = params
        .iter()
        .filter(|p| p["name"] == "gateway_key")
        .collect();
    assert_eq!(gateway.len(), 1);
    assert_eq!(gateway[0]["in"], "query");
    assert_eq!(gateway[0]["schema"]["default"], KEY);
    assert_eq!(doc["security"], json!([{ "ApiKeyAuth": [] }]));
    assert!(doc["components"]["securitySchemes"]["ApiKeyAuth"].is_object());

    // the path-level summary is not an operation
    assert_eq!(doc["paths"]["/serviceA/items"]["summary"], "collection");

    // a second fetch injects afresh, never duplicating
    let (_, again) = get(router(state), "/openapi/serviceA").await;
    assert_eq!(operation_params(&again, "/serviceA/items"), params);
}

#[tokio::test]
async fn all_services_injection_can_be_enabled() {
    let a = mock_backend(backend_document("Item", "a")).await;
    let descriptor = service("serviceA", &a.uri()).with_gateway_api(json!({}));
    let mut options = fast_options();
    options.inject_all_services = true;
    let forwarder = Arc::new(HttpForwarder::new(reqwest::Client::new(), TIMEOUT));
    let state = state_with(vec![descriptor], forwarder, options);
    state.rebuild_combined().await.unwrap();

    let (_, doc) = get(router(state), "/openapi.json").await;
    let params = operation_params(&doc, "/serviceA/items");
    assert_eq!(params.len(), 2);
    assert_eq!(params[1]["name"], "gateway_key");
}

#[tokio::test]
async fn unknown_service_document_is_404() {
    let state = http_state(Vec::new(), TIMEOUT);
    let (status, body) = get(router(state), "/openapi/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SERVICE_NOT_FOUND");
}

#[tokio::test]
async fn single_service_fetch_failure_is_reported_in_document() {
    let state = http_state(vec![service("down", "http://127.0.0.1:9")], TIMEOUT);
    let (status, doc) = get(router(state), "/openapi/down").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"].as_object().unwrap().is_empty());
    assert_eq!(doc[UNAVAILABLE_EXTENSION], json!(["down"]));
}
