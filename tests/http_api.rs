//! Black-box tests: a real listener on a loopback port, driven with reqwest

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use contract_gateway::graph::{GraphSchema, GraphStore, GremlinQuery, GremlinResponse, InMemoryGraph};
use contract_gateway::ledger::InMemoryLedger;
use contract_gateway::readiness::{spawn_preflight, ReadinessGate};
use contract_gateway::server::serve;
use contract_gateway::{AppState, Args, GatewayError, Result};

struct UnreachableGraph;

#[async_trait]
impl GraphStore for UnreachableGraph {
    async fn set_schema(&self, _schema: &GraphSchema) -> Result<Value> {
        Err(GatewayError::Backend("connection refused".into()))
    }

    async fn gremlin(&self, _query: &GremlinQuery) -> Result<GremlinResponse> {
        Err(GatewayError::Backend("connection refused".into()))
    }
}

fn args() -> Args {
    Args::parse_from([
        "contract-gateway",
        "--dev-mode",
        "--preflight-interval-secs",
        "0",
        "--request-timeout-ms",
        "2000",
    ])
}

async fn start(state: AppState) -> (SocketAddr, Arc<AppState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(state);
    tokio::spawn(serve(listener, Arc::clone(&state)));
    (addr, state)
}

/// Server whose readiness gate is driven by the real preflight task
async fn start_ready(graph: Arc<dyn GraphStore>) -> SocketAddr {
    let state = AppState::new(args(), Arc::new(InMemoryLedger::new()), graph);
    let (addr, state) = start(state).await;
    let ready = spawn_preflight(
        Arc::clone(&state.readiness),
        Arc::clone(&state.records),
        3,
        Duration::from_millis(10),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(ready.attempts, 1);
    addr
}

fn c1() -> Value {
    json!({
        "name": "C1",
        "startdate": "2016-06-01",
        "enddate": "2017-06-01",
        "location": "NYC",
        "text": "hello",
        "party1": "A",
        "party2": "B",
        "title": "T"
    })
}

#[tokio::test]
async fn test_create_read_and_query_by_location() {
    let addr = start_ready(Arc::new(InMemoryGraph::new())).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/api", addr);

    let created: Value = client
        .post(format!("{}/create", base))
        .json(&c1())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["message"], "Transaction Complete");

    let read = client
        .post(format!("{}/read", base))
        .json(&json!({"name": "C1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(read.status(), 200);
    assert_eq!(read.json::<Value>().await.unwrap(), c1());

    let query: Value = client
        .post(format!("{}/querylocation", base))
        .json(&json!({"location": "NYC"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(query, json!({"results": {"C1": c1()}}));

    let index: Value = client
        .post(format!("{}/index", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(index, json!(["C1"]));
}

#[tokio::test]
async fn test_missing_record_and_empty_index() {
    let addr = start_ready(Arc::new(InMemoryGraph::new())).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/api", addr);

    let read = client
        .post(format!("{}/read", base))
        .json(&json!({"name": "missing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(read.status(), 404);
    let body: Value = read.json().await.unwrap();
    assert_eq!(body["status"], 404);

    let index = client.post(format!("{}/index", base)).send().await.unwrap();
    assert_eq!(index.status(), 200);
    assert_eq!(index.json::<Value>().await.unwrap(), json!([]));
}

#[tokio::test]
async fn test_mirror_outage_does_not_fail_create() {
    let addr = start_ready(Arc::new(UnreachableGraph)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/api", addr);

    let created = client
        .post(format!("{}/create", base))
        .json(&c1())
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);
    assert_eq!(
        created.json::<Value>().await.unwrap()["message"],
        "Transaction Complete"
    );

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["mirror"]["failed_writes"], 1);

    let query = client
        .post(format!("{}/querylocation", base))
        .json(&json!({"location": "NYC"}))
        .send()
        .await
        .unwrap();
    assert_eq!(query.status(), 502);
}

#[tokio::test]
async fn test_api_unavailable_before_ready() {
    let state = AppState::new(
        args(),
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryGraph::new()),
    )
    .with_readiness(Arc::new(ReadinessGate::new()));
    let (addr, _) = start(state).await;
    let client = reqwest::Client::new();

    let index = client
        .post(format!("http://{}/api/index", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(index.status(), 503);

    let ready = client
        .get(format!("http://{}/readyz", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), 503);

    let health = client
        .get(format!("http://{}/healthz", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);
}

#[tokio::test]
async fn test_unknown_routes_and_cors() {
    let addr = start_ready(Arc::new(InMemoryGraph::new())).await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("http://{}/api/nothing-here", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(missing.headers()["access-control-allow-origin"], "*");
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["status"], 404);

    let outside = client
        .get(format!("http://{}/elsewhere", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(outside.status(), 404);

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("http://{}/api/create", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 200);

    let root: Value = client
        .get(format!("http://{}/api/", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(root["message"].is_string());
}

#[tokio::test]
async fn test_form_encoded_bodies() {
    let addr = start_ready(Arc::new(InMemoryGraph::new())).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/api", addr);

    let created = client
        .post(format!("{}/create", base))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("name=F1&startdate=s&enddate=e&location=SFO&text=t&party1=A&party2=B&title=T")
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);

    let read: Value = client
        .post(format!("{}/read", base))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("name=F1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(read["location"], "SFO");
}
