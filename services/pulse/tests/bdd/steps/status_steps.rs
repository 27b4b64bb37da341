//! BDD step definitions for the status API

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use chrono::{Duration, Utc};
use cucumber::{given, then, when};
use tower::ServiceExt;

use pulse::config::EndpointConfig;
use pulse::delivery::DeliveryStats;
use pulse::log_store::{LogRecord, LogSink};
use pulse::probe::ProbeResult;
use pulse::state::new_state_handle;
use pulse::status::{build_router, StatusState};
use pulse::tracker::{EndpointState, HealthStatus};

use crate::world::PulseWorld;

fn endpoint<'a>(world: &'a PulseWorld, name: &str) -> &'a EndpointConfig {
    world
        .endpoints
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("no endpoint named '{}'", name))
}

#[given(expr = "a monitored endpoint {string} at {string}")]
fn monitored_endpoint(world: &mut PulseWorld, name: String, url: String) {
    world.endpoints.push(EndpointConfig::new(name, url));
    world.state = Some(new_state_handle(&world.endpoints, 10));
}

#[given(expr = "{string} has failed {int} checks in a row")]
async fn failed_checks(world: &mut PulseWorld, name: String, count: u64) {
    let endpoint = endpoint(world, &name).clone();
    let mut tracked = EndpointState::new();
    for sequence in 1..=count {
        let result = ProbeResult::failed(&endpoint, Utc::now(), "connection refused");
        tracked
            .observe(&endpoint, sequence, result)
            .expect("fresh result rejected");
    }
    let state = world.state.as_ref().expect("no endpoints");
    state.write().await.update_endpoint(&name, &tracked);
}

#[given(regex = r#"^the log store holds an? "(UP|DOWN)" result for "([^"]*)" taking (\d+) ms$"#)]
fn log_store_holds(world: &mut PulseWorld, status: String, name: String, millis: f64) {
    let url = endpoint(world, &name).url.clone();
    let mut records = world.log_sink.records.lock().unwrap();
    let timestamp = Utc::now() + Duration::seconds(records.len() as i64);
    records.push(LogRecord {
        url,
        name,
        status: if status == "UP" {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        },
        response_time: Some(millis),
        status_code: Some(if status == "UP" { 200 } else { 503 }),
        error: None,
        timestamp,
    });
}

#[when(expr = "a client requests {string}")]
async fn client_requests(world: &mut PulseWorld, uri: String) {
    let status = StatusState {
        state: Arc::clone(world.state.as_ref().expect("no endpoints")),
        stats: Arc::new(DeliveryStats::default()),
        log_sink: Arc::clone(&world.log_sink) as Arc<dyn LogSink>,
    };

    let response = build_router(status)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    world.response_status = Some(response.status().as_u16());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_json = serde_json::from_slice(&body).ok();
}

#[then(expr = "the response status is {int}")]
fn response_status(world: &mut PulseWorld, status: u16) {
    assert_eq!(world.response_status, Some(status));
}

fn field<'a>(world: &'a PulseWorld, pointer: &str) -> &'a serde_json::Value {
    world
        .response_json
        .as_ref()
        .expect("response was not JSON")
        .pointer(pointer)
        .unwrap_or_else(|| panic!("no field at '{}'", pointer))
}

#[then(regex = r#"^the response field "([^"]*)" is "([^"]*)"$"#)]
fn field_is_string(world: &mut PulseWorld, pointer: String, expected: String) {
    assert_eq!(field(world, &pointer), &serde_json::Value::from(expected));
}

#[then(regex = r#"^the response field "([^"]*)" is (\d+)$"#)]
fn field_is_number(world: &mut PulseWorld, pointer: String, expected: u64) {
    assert_eq!(field(world, &pointer).as_u64(), Some(expected));
}

#[then(regex = r#"^the response field "([^"]*)" is (true|false)$"#)]
fn field_is_bool(world: &mut PulseWorld, pointer: String, expected: bool) {
    assert_eq!(field(world, &pointer).as_bool(), Some(expected));
}

#[then("the response has an error message")]
fn has_error(world: &mut PulseWorld) {
    let error = field(world, "/error").as_str().unwrap_or_default();
    assert!(!error.is_empty());
}
