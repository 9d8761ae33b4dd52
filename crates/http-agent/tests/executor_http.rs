//! End-to-end request tests against a local mock server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use httpmock::prelude::*;
use serde_json::{json, Map, Value};

use http_agent::config::{AgentSettings, ContentType, EndpointConfig, HeaderPair, PoolSettings, SensorConfig, SensorType};
use http_agent::{
    AgentEvent, ConnectionPool, EndpointInstance, HttpMethod, JinjaRenderer, OutcomeState, RequestExecutor,
    RequestSpec, ServiceCall, ServiceKind,
};

// ─────────────────────── helpers ───────────────────────

fn executor() -> RequestExecutor {
    executor_with(PoolSettings::default())
}

fn executor_with(settings: PoolSettings) -> RequestExecutor {
    RequestExecutor::new(
        Arc::new(ConnectionPool::new(settings)),
        Arc::new(JinjaRenderer::new()),
    )
}

fn instance(config: EndpointConfig) -> EndpointInstance {
    EndpointInstance::new(config, &AgentSettings::default(), Arc::new(JinjaRenderer::new()))
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn sensor(name: &str, sensor_type: SensorType, state: &str) -> SensorConfig {
    SensorConfig {
        name: name.to_string(),
        sensor_type,
        state: Some(state.to_string()),
        ..SensorConfig::default()
    }
}

// ─────────────────────── outcome classification ───────────────────────

#[tokio::test]
async fn test_success_collects_status_headers_and_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/status");
            then.status(200)
                .header("Content-Type", "application/json")
                .header("X-Device", "boiler")
                .json_body(json!({"temp": 21}));
        })
        .await;

    let (response, metadata) = executor().execute(&RequestSpec::new(server.url("/status"))).await;
    mock.assert_async().await;

    assert_eq!(response.state(), OutcomeState::Ok);
    assert_eq!(response.status_code(), Some(200));
    assert_eq!(response.header("x-device"), Some("boiler"));
    assert_eq!(http_agent::extract(&response, "temp"), Some(json!(21)));
    assert_eq!(metadata.url, server.url("/status"));
    assert_eq!(metadata.method, HttpMethod::Get);
    assert!(metadata.error.is_none());
}

#[tokio::test]
async fn test_not_found_is_error_with_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/missing");
            then.status(404).body("nope");
        })
        .await;

    let result = executor()
        .execute_result(&RequestSpec::new(server.url("/missing")))
        .await;
    assert_eq!(result.state, OutcomeState::Error);
    assert_eq!(result.status_code, Some(404));
    assert_eq!(result.response_text, "nope");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/slow");
            then.status(200).delay(Duration::from_secs(3)).body("late");
        })
        .await;

    let spec = RequestSpec::new(server.url("/slow")).with_timeout(Duration::from_secs(1));
    let started = Instant::now();
    let result = executor().execute_result(&spec).await;

    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(result.state, OutcomeState::Timeout);
    assert_eq!(result.error.as_deref(), Some("Timeout"));
    assert_eq!(result.status_code, None);
    assert_eq!(result.response_text, "");
    assert!(result.headers.is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_error_with_message() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let result = executor()
        .execute_result(&RequestSpec::new(format!("http://127.0.0.1:{port}/x")))
        .await;

    assert_eq!(result.state, OutcomeState::Error);
    assert_eq!(result.status_code, None);
    assert_eq!(result.response_text, "");
    assert!(result.error.is_some());
}

// ─────────────────────── request building ───────────────────────

#[tokio::test]
async fn test_query_string_is_appended() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.path("/q").query_param("z", "2").query_param("a", "1");
            then.status(200);
        })
        .await;

    let spec = RequestSpec::new(server.url("/q?z=2")).with_querystring("a={{ n }}").with_variable("n", json!(1));
    let (_, metadata) = executor().execute(&spec).await;

    mock.assert_async().await;
    assert!(metadata.url.ends_with("/q?z=2&a=1"));
}

#[tokio::test]
async fn test_templated_url_and_headers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/devices/7")
                .header("authorization", "Bearer s3cret");
            then.status(204);
        })
        .await;

    let spec = RequestSpec::new("{{ base }}/devices/{{ id }}")
        .with_header("Authorization", "Bearer {{ token }}")
        .with_variable("base", json!(server.base_url()))
        .with_variable("id", json!(7))
        .with_variable("token", json!("s3cret"));
    let result = executor().execute_result(&spec).await;

    mock.assert_async().await;
    assert_eq!(result.status_code, Some(204));
    assert_eq!(result.url, format!("{}/devices/7", server.base_url()));
}

#[tokio::test]
async fn test_json_payload_is_sent_as_json() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/switch")
                .header("content-type", "application/json")
                .json_body(json!({"on": true, "level": 3}));
            then.status(200);
        })
        .await;

    let spec = RequestSpec::new(server.url("/switch"))
        .with_method(HttpMethod::Post)
        .with_payload(r#"{"on": true, "level": {{ level }}}"#)
        .with_variable("level", json!(3));
    let result = executor().execute_result(&spec).await;

    mock.assert_async().await;
    assert_eq!(result.state, OutcomeState::Ok);
}

#[tokio::test]
async fn test_text_payload_uses_configured_content_type() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/form")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("a=1&b=two");
            then.status(200);
        })
        .await;

    let spec = RequestSpec::new(server.url("/form"))
        .with_method(HttpMethod::Put)
        .with_payload("a=1&b={{ b }}")
        .with_content_type(ContentType::FormUrlEncoded)
        .with_variable("b", json!("two"));
    executor().execute(&spec).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn test_text_payload_with_json_content_type_is_sent_as_plain_text() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/power")
                .header("content-type", "text/plain")
                .body("power=on");
            then.status(200);
        })
        .await;

    let mut config = EndpointConfig::new("plug", server.url("/power"));
    config.method = HttpMethod::Post;
    config.payload = Some("power=on".to_string());
    config.content_type = Some(ContentType::Json);

    let outcome = instance(config).poll().await.unwrap();
    mock.assert_async().await;
    assert_eq!(outcome.result.status_code, Some(200));
}

// ─────────────────────── pool ───────────────────────

#[tokio::test]
async fn test_per_host_limit_serializes_requests() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.path("/busy");
            then.status(200).delay(Duration::from_millis(300));
        })
        .await;

    let exec = executor_with(PoolSettings {
        max_connections: 10,
        max_per_host: 1,
        idle_timeout: Duration::from_secs(5),
    });
    let spec = RequestSpec::new(server.url("/busy"));

    let started = Instant::now();
    let (a, b) = tokio::join!(exec.execute_result(&spec), exec.execute_result(&spec));

    assert_eq!(a.state, OutcomeState::Ok);
    assert_eq!(b.state, OutcomeState::Ok);
    assert!(started.elapsed() >= Duration::from_millis(550));
    assert_eq!(mock.hits_async().await, 2);
}

#[tokio::test]
async fn test_pool_reopens_after_close() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/ping");
            then.status(200);
        })
        .await;

    let exec = executor();
    let spec = RequestSpec::new(server.url("/ping"));
    assert_eq!(exec.execute_result(&spec).await.state, OutcomeState::Ok);
    assert!(exec.pool().close());
    assert!(!exec.pool().close());
    assert_eq!(exec.execute_result(&spec).await.state, OutcomeState::Ok);
    assert!(exec.pool().is_open());
}

// ─────────────────────── instances ───────────────────────

#[tokio::test]
async fn test_poll_extracts_sensor_readings() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/status.xml");
            then.status(200)
                .header("Content-Type", "application/xml")
                .body(r#"<status><temp unit="C">21.5</temp><door>closed</door></status>"#);
        })
        .await;

    let mut config = EndpointConfig::new("boiler", server.url("/status.xml"));
    config.sensors = vec![
        SensorConfig {
            unit: Some("°C".to_string()),
            ..sensor("temp", SensorType::Number, "temp")
        },
        sensor("door", SensorType::BinarySensor, "//door"),
        sensor("unit", SensorType::Sensor, "temp/@unit"),
        sensor("missing", SensorType::Sensor, "nothing/here"),
    ];
    let boiler = instance(config);
    let mut events = boiler.events().subscribe();

    let outcome = boiler.poll().await.unwrap();
    assert_eq!(outcome.result.state, OutcomeState::Ok);
    assert_eq!(outcome.sensors["temp"].native_number(), Some(21.5));
    assert_eq!(outcome.sensors["temp"].unit.as_deref(), Some("°C"));
    assert_eq!(outcome.sensors["door"].is_on(), Some(false));
    assert_eq!(outcome.sensors["unit"].state, Some(json!("C")));
    assert_eq!(outcome.sensors["missing"].state, None);

    match events.recv().await.unwrap() {
        AgentEvent::PollCompleted {
            endpoint,
            state,
            status_code,
            ..
        } => {
            assert_eq!(endpoint, "boiler");
            assert_eq!(state, OutcomeState::Ok);
            assert_eq!(status_code, Some(200));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_poll_uses_endpoint_request_settings() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rpc")
                .query_param("key", "k1")
                .header("x-api", "v2")
                .body("status please");
            then.status(200)
                .header("Content-Type", "text/html")
                .body(r#"<html><body><p class="mode">eco</p></body></html>"#);
        })
        .await;

    let mut config = EndpointConfig::new("rpc", server.url("/rpc"));
    config.method = HttpMethod::Post;
    config.headers = vec![HeaderPair::new("X-Api", "v{{ version }}")];
    config.payload = Some("status please".to_string());
    config.querystring = Some("key=k1".to_string());
    config.variables = object(json!({"version": 2}));
    config.sensors = vec![sensor("mode", SensorType::Sensor, "p.mode")];

    let outcome = instance(config).poll().await.unwrap();
    mock.assert_async().await;
    assert_eq!(outcome.sensors["mode"].state, Some(json!("eco")));
}

#[tokio::test]
async fn test_failed_poll_yields_absent_readings() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/down");
            then.status(503).header("Content-Type", "application/json").json_body(json!({"v": 1}));
        })
        .await;

    let mut config = EndpointConfig::new("down", server.url("/down"));
    config.sensors = vec![sensor("v", SensorType::Sensor, "v")];
    let outcome = instance(config).poll().await.unwrap();

    assert_eq!(outcome.result.state, OutcomeState::Error);
    assert_eq!(outcome.result.display_state(), "503");
    // The body of a non-2xx response is still parsed.
    assert_eq!(outcome.sensors["v"].state, Some(json!(1)));
}

#[tokio::test]
async fn test_service_call_publishes_response_event() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/lights").json_body(json!({"room": "hall"}));
            then.status(201)
                .header("Content-Type", "application/json")
                .json_body(json!({"accepted": true}));
        })
        .await;

    let hub = instance(EndpointConfig::new("hub", server.url("/")));
    let mut events = hub.events().subscribe();

    let call = ServiceCall::new(
        ServiceKind::Post,
        object(json!({
            "url": server.url("/lights"),
            "payload": "{\"room\": \"{{ room }}\"}",
            "room": "hall"
        })),
    );
    let result = hub.call_service(&call).await.unwrap();
    mock.assert_async().await;

    assert_eq!(result.status_code, Some(201));
    assert_eq!(result.response, Some(json!({"accepted": true})));
    assert_eq!(result.method, HttpMethod::Post);

    match events.recv().await.unwrap() {
        event @ AgentEvent::Response { .. } => {
            assert_eq!(event.name(), http_agent::RESPONSE_EVENT);
            if let AgentEvent::Response { service, data, result } = event {
                assert_eq!(service, "http_post");
                assert_eq!(data["room"], "hall");
                assert_eq!(result.status_code, Some(201));
            }
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_service_call_without_url_fails_before_io() {
    let hub = instance(EndpointConfig::new("hub", "http://127.0.0.1:9/"));
    let call = ServiceCall::new(ServiceKind::Get, object(json!({"payload": "x"})));
    let err = hub.call_service(&call).await.unwrap_err();
    assert!(matches!(err, http_agent::AgentError::MissingUrl));
}
