//! HTTP builtins against a mocked endpoint

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weft::functions::install_builtins;
use weft::{FunctionRegistry, ParamMap};

fn builtin_registry() -> FunctionRegistry {
    let registry = FunctionRegistry::new();
    install_builtins(&registry);
    registry
}

#[tokio::test]
async fn get_shorthand_fetches_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let registry = builtin_registry();
    let func = registry.lookup("http_request_get").unwrap();

    let mut params = ParamMap::default();
    params.insert("url".to_string(), json!(format!("{}/ping", server.uri())));

    let result = (*func)(params).await.unwrap();
    assert_eq!(result, json!("pong"));
}

#[tokio::test]
async fn post_json_shorthand_sends_data_as_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(json!({"name": "weft", "n": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .mount(&server)
        .await;

    let registry = builtin_registry();
    let func = registry.lookup("http_request_post_json").unwrap();

    let mut params = ParamMap::default();
    params.insert("url".to_string(), json!(format!("{}/submit", server.uri())));
    params.insert("data".to_string(), json!({"name": "weft", "n": 3}));

    let result = (*func)(params).await.unwrap();
    assert_eq!(result, json!(r#"{"ok":true}"#));
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker died"))
        .mount(&server)
        .await;

    let registry = builtin_registry();
    let func = registry.lookup("http_request").unwrap();

    let mut params = ParamMap::default();
    params.insert("url".to_string(), json!(server.uri()));

    let err = (*func)(params).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("500"));
    assert!(msg.contains("worker died"));
}
