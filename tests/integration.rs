use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use baton::{
    DefaultAssertionController, DefaultScenarioRunner, DefaultStepRunner, HttpMethod,
    ReqwestTransport, RunConfig, ScenarioLoader, ScenarioRunner, Source, Step, StepError,
    StepRunner, StepType, Variable, VariableStore,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

struct TestServer {
    base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route(
                "/login",
                post(|| async move {
                    (
                        [("X-Req-Id", "abc")],
                        Json(json!({
                            "token": "t-123",
                            "user": {"id": 42, "age": 30.0, "admin": true}
                        })),
                    )
                }),
            )
            .route(
                "/me",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization") {
                        Some(value) => (
                            StatusCode::OK,
                            Json(json!({
                                "authorization": value.to_str().unwrap_or_default(),
                                "client": headers
                                    .get("x-client")
                                    .and_then(|v| v.to_str().ok())
                                    .unwrap_or_default(),
                            })),
                        ),
                        None => (StatusCode::UNAUTHORIZED, Json(json!({}))),
                    }
                }),
            )
            .route(
                "/search",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    Json(json!({ "query": params }))
                }),
            )
            .route("/echo", post(|body: String| async move { body }))
            .route(
                "/missing",
                get(|| async move { (StatusCode::NOT_FOUND, Json(json!({"error": "nope"}))) }),
            );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });
        let base_url = format!("http://{addr}");

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn step_runner() -> DefaultStepRunner {
    DefaultStepRunner::new(
        Arc::new(ReqwestTransport::new()),
        Arc::new(DefaultAssertionController),
    )
}

fn response_json(result: &baton::ResultStep) -> &Value {
    &result.response.as_ref().expect("missing response").body
}

#[tokio::test]
async fn extracted_variables_feed_later_requests() {
    let server = TestServer::spawn().await;
    let runner = step_runner();
    let mut store = VariableStore::new();
    store.add("host", server.base_url.clone());

    let mut login = Step::request(HttpMethod::Post, "{{host}}/login");
    login.variables = vec![
        Variable::new("token", Source::ResponseJson, "token"),
        Variable::new("age", Source::ResponseJson, "user.age"),
        Variable::new("admin", Source::ResponseJson, "user.admin"),
        Variable::new("rid", Source::ResponseHeader, "X-Req-Id"),
        Variable::new("status", Source::ResponseStatus, ""),
        Variable::new("elapsed", Source::ResponseTime, ""),
    ];
    let result = runner.run(&login, &mut store).await.unwrap();

    assert!(result.is_success(), "{:?}", result.variables_created);
    assert_eq!(store.get("token"), Some("t-123"));
    assert_eq!(store.get("age"), Some("30"));
    assert_eq!(store.get("admin"), Some("true"));
    assert_eq!(store.get("rid"), Some("abc"));
    assert_eq!(store.get("status"), Some("200"));
    assert!(store
        .get("elapsed")
        .is_some_and(|v| v.parse::<u64>().is_ok()));

    let mut me = Step::request(HttpMethod::Get, "{{host}}/me");
    me.headers.insert(
        "Authorization".to_string(),
        vec!["Bearer {{token}}".to_string()],
    );
    let result = runner.run(&me, &mut store).await.unwrap();

    assert_eq!(response_json(&result)["authorization"], "Bearer t-123");
    let keys: Vec<&str> = result
        .variables_applied
        .iter()
        .map(|v| v.key.as_str())
        .collect();
    assert_eq!(keys, vec!["URL", "headers.Authorization"]);

    server.shutdown().await;
}

#[tokio::test]
async fn query_params_and_body_are_patched() {
    let server = TestServer::spawn().await;
    let runner = step_runner();
    let mut store: VariableStore = [("term", "rust lang"), ("id", "7")].into_iter().collect();

    let url = format!("{}/search?q={{{{term}}}}&page=1", server.base_url);
    let result = runner
        .run(&Step::request(HttpMethod::Get, url), &mut store)
        .await
        .unwrap();
    assert_eq!(response_json(&result)["query"]["q"], "rust lang");
    assert_eq!(response_json(&result)["query"]["page"], "1");
    assert_eq!(result.variables_applied.len(), 1);
    assert_eq!(result.variables_applied[0].key, "params[q]");

    let mut echo = Step::request(HttpMethod::Post, format!("{}/echo", server.base_url));
    echo.body = r#"{"id": {{id}}, "missing": "{{nope}}"}"#.to_string();
    echo.variables = vec![Variable::new("echoed", Source::ResponseJson, "id")];
    let result = runner.run(&echo, &mut store).await.unwrap();

    assert_eq!(
        result.request.as_ref().unwrap().body,
        br#"{"id": 7, "missing": "{{nope}}"}"#.to_vec()
    );
    assert_eq!(store.get("echoed"), Some("7"));

    server.shutdown().await;
}

#[tokio::test]
async fn not_found_status_is_data_not_error() {
    let server = TestServer::spawn().await;
    let mut store = VariableStore::new();

    let mut step = Step::request(HttpMethod::Get, format!("{}/missing", server.base_url));
    step.variables = vec![
        Variable::new("status", Source::ResponseStatus, ""),
        Variable::new("error", Source::ResponseJson, "error"),
        Variable::new("whole", Source::ResponseJson, ""),
    ];
    let result = step_runner().run(&step, &mut store).await.unwrap();

    assert_eq!(store.get("status"), Some("404"));
    assert_eq!(store.get("error"), Some("nope"));
    assert!(store.get("whole").is_none());
    assert!(result.variables_created[2].is_error());

    server.shutdown().await;
}

#[tokio::test]
async fn transport_failure_leaves_store_untouched() {
    // Bind and release a port so nothing is listening on it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut store: VariableStore = [("host", format!("http://{addr}"))].into_iter().collect();
    let before = store.clone();

    let mut step = Step::request(HttpMethod::Get, "{{host}}/anything");
    step.variables = vec![Variable::new("status", Source::ResponseStatus, "")];
    let failure = step_runner().run(&step, &mut store).await.unwrap_err();

    assert!(matches!(failure.error, StepError::Transport(_)));
    assert_eq!(
        failure.partial.request.as_ref().unwrap().base_url,
        format!("http://{addr}/anything")
    );
    assert!(failure.partial.response.is_none());
    assert_eq!(store, before);
}

#[tokio::test]
async fn scenario_file_runs_end_to_end() {
    let server = TestServer::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let scenario_path = dir.path().join("login.yaml");
    let content = r#"
name: login flow
description: log in and read the profile
steps:
  - step_type: request
    method: POST
    url: "{{host}}/login"
    assertions:
      - source: response_status
        comparison: equal
        value: 200
      - source: response_json
        property: user.id
        comparison: equal_number
        value: 42
    variables:
      - name: token
        source: response_json
        property: token
  - step_type: pause
    duration: 0
  - step_type: request
    method: GET
    url: "{{host}}/me"
    headers:
      Authorization:
        - "Bearer {{token}}"
    assertions:
      - source: response_json
        property: authorization
        comparison: equal
        value: "Bearer t-123"
      - source: response_json
        property: client
        comparison: equal
        value: "baton-t-123"
"#;
    fs::write(&scenario_path, content).unwrap();

    let scenario = ScenarioLoader::new().load_scenario(&scenario_path).unwrap();

    let config = RunConfig {
        headers: BTreeMap::from([("X-Client".to_string(), "baton-{{token}}".to_string())]),
        variables: BTreeMap::from([("host".to_string(), server.base_url.clone())]),
        timeout: Some(5),
    };
    let runner = DefaultScenarioRunner::from_config(&config);
    let result = runner.run(&scenario).await;

    assert!(result.success, "scenario failed: {:#?}", result.steps);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.steps[1].step_type, StepType::Pause);
    assert!(result.steps[1].request.is_none());
    assert!(result.steps[2]
        .variables_applied
        .iter()
        .any(|v| v.key == "headers.X-Client"));

    server.shutdown().await;
}

#[tokio::test]
async fn failing_assertion_marks_scenario_failed() {
    let server = TestServer::spawn().await;
    let scenario = baton::Scenario::from_json(&format!(
        r#"{{
            "name": "unauthorized",
            "steps": [{{
                "step_type": "request",
                "url": "{}/me",
                "assertions": [
                    {{"source": "response_status", "comparison": "equal", "value": 200}}
                ]
            }}]
        }}"#,
        server.base_url
    ))
    .unwrap();

    let result = DefaultScenarioRunner::from_config(&RunConfig::default())
        .run(&scenario)
        .await;

    assert!(!result.success);
    assert!(result.error.is_none());
    assert_eq!(
        result.steps[0].assertions[0].message,
        "response_status equal 200 (actual: 401)"
    );

    server.shutdown().await;
}
