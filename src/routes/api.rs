//! Contract record API
//!
//! Routes under the API prefix:
//! - GET  /            - greeting
//! - GET  /chainstats  - chain statistics passthrough
//! - POST /create      - submit a new contract record
//! - POST /read        - fetch a record by name
//! - POST /delete      - delete a record by name
//! - POST /index       - list all record names
//! - POST /querylocation - records linked to a location, via the graph mirror
//! - GET  /graphinit   - create the graph schema
//!
//! Bodies are JSON or urlencoded forms; an empty body reads as `{}`. Every
//! route is refused with 503 until the preflight gate opens.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::{error_response, json_response};
use crate::graph::GraphSchema;
use crate::records::{CreateRequest, NameRequest};
use crate::server::http::not_found_response;
use crate::server::AppState;
use crate::types::{with_deadline, GatewayError, Result};

const GREETING: &str = "Contract gateway API. POST to /create, /read, /delete, /index or /querylocation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiRoute {
    Root,
    ChainStats,
    Create,
    Read,
    Delete,
    Index,
    QueryLocation,
    GraphInit,
}

impl ApiRoute {
    fn resolve(method: &Method, route: &str) -> Option<Self> {
        let route = match route.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        match (method, route) {
            (&Method::GET, "/") => Some(ApiRoute::Root),
            (&Method::GET, "/chainstats") => Some(ApiRoute::ChainStats),
            (&Method::POST, "/create") => Some(ApiRoute::Create),
            (&Method::POST, "/read") => Some(ApiRoute::Read),
            (&Method::POST, "/delete") => Some(ApiRoute::Delete),
            (&Method::POST, "/index") => Some(ApiRoute::Index),
            (&Method::POST, "/querylocation") => Some(ApiRoute::QueryLocation),
            (&Method::GET, "/graphinit") => Some(ApiRoute::GraphInit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LocationRequest {
    location: Option<String>,
}

/// Handle a request whose path has already had the API prefix removed
pub async fn handle_api_request(
    state: Arc<AppState>,
    method: &Method,
    route: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let Some(api_route) = ApiRoute::resolve(method, route) else {
        return not_found_response(&format!("{}{}", state.api_prefix, route));
    };

    if let Err(e) = state.readiness.ensure_ready() {
        return error_response(&e);
    }

    match execute(&state, api_route, content_type, &body).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn execute(
    state: &AppState,
    route: ApiRoute,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Response<Full<Bytes>>> {
    match route {
        ApiRoute::Root => Ok(json_response(StatusCode::OK, &json!({ "message": GREETING }))),

        ApiRoute::ChainStats => {
            let stats = state.records.chain_stats().await?;
            Ok(json_response(StatusCode::OK, &stats))
        }

        ApiRoute::Create => {
            let fields = parse_body::<CreateRequest>(content_type, body)?.validate()?;
            let ack = state.records.create(&fields).await?;
            Ok(json_response(StatusCode::OK, &ack))
        }

        ApiRoute::Read => {
            let name = parse_body::<NameRequest>(content_type, body)?.validate()?;
            let record = state.records.read(&name).await?;
            Ok(json_response(StatusCode::OK, &record))
        }

        ApiRoute::Delete => {
            let name = parse_body::<NameRequest>(content_type, body)?.validate()?;
            let ack = state.records.delete(&name).await?;
            Ok(json_response(StatusCode::OK, &ack))
        }

        ApiRoute::Index => {
            let names = state.records.list_index().await?;
            Ok(json_response(StatusCode::OK, &names))
        }

        ApiRoute::QueryLocation => {
            let location = parse_body::<LocationRequest>(content_type, body)?
                .location
                .ok_or_else(|| GatewayError::Validation("Missing required fields: location".into()))?;
            let results = state.query.query_by_location(&location).await?;
            Ok(json_response(StatusCode::OK, &json!({ "results": results })))
        }

        ApiRoute::GraphInit => {
            let schema = GraphSchema::contracts();
            let created = with_deadline(
                state.args.request_timeout(),
                "graph schema setup",
                state.graph.set_schema(&schema),
            )
            .await?;
            info!("Graph schema initialized");
            Ok(json_response(StatusCode::OK, &created))
        }
    }
}

/// Decode a JSON or urlencoded body; an empty body is `T::default()`
fn parse_body<T>(content_type: Option<&str>, body: &[u8]) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    let is_form = content_type
        .map(|ct| ct.trim().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| GatewayError::Validation(format!("Invalid form body: {}", e)))
    } else {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Validation(format!("Invalid JSON body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::graph::InMemoryGraph;
    use crate::ledger::InMemoryLedger;
    use crate::readiness::ReadinessGate;
    use clap::Parser;
    use http_body_util::BodyExt;
    use serde_json::Value;

    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");
    const JSON: Option<&str> = Some("application/json");

    fn ready_state() -> (Arc<AppState>, Arc<InMemoryGraph>) {
        let graph = Arc::new(InMemoryGraph::new());
        let state = AppState::new(
            Args::parse_from(["contract-gateway", "--dev-mode"]),
            Arc::new(InMemoryLedger::new()),
            graph.clone(),
        )
        .with_readiness(Arc::new(ReadinessGate::ready()));
        (Arc::new(state), graph)
    }

    async fn call(
        state: &Arc<AppState>,
        method: Method,
        route: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let response = handle_api_request(
            Arc::clone(state),
            &method,
            route,
            content_type,
            Bytes::from(body.to_string()),
        )
        .await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_route_resolution() {
        assert_eq!(ApiRoute::resolve(&Method::GET, "/"), Some(ApiRoute::Root));
        assert_eq!(ApiRoute::resolve(&Method::POST, "/read/"), Some(ApiRoute::Read));
        assert_eq!(ApiRoute::resolve(&Method::GET, "/read"), None);
        assert_eq!(ApiRoute::resolve(&Method::POST, "/update"), None);
    }

    #[test]
    fn test_parse_body_formats() {
        let form: NameRequest = parse_body(FORM, b"name=C1").unwrap();
        assert_eq!(form.name.as_deref(), Some("C1"));

        let json: NameRequest = parse_body(JSON, br#"{"name":"C2"}"#).unwrap();
        assert_eq!(json.name.as_deref(), Some("C2"));

        let untyped: NameRequest = parse_body(None, br#"{"name":"C3"}"#).unwrap();
        assert_eq!(untyped.name.as_deref(), Some("C3"));

        let empty: NameRequest = parse_body(JSON, b"").unwrap();
        assert!(empty.name.is_none());

        assert!(matches!(
            parse_body::<NameRequest>(JSON, b"{nope"),
            Err(GatewayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_read_delete_over_form_bodies() {
        let (state, _) = ready_state();
        let create = "name=C1&startdate=2016-06-01&enddate=2017-06-01&location=NYC\
                      &text=hello&party1=A&party2=B&title=T";

        let (status, body) = call(&state, Method::POST, "/create", FORM, create).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Transaction Complete");

        let (status, body) = call(&state, Method::POST, "/read", FORM, "name=C1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], "NYC");
        assert_eq!(body["party2"], "B");

        let (status, _) = call(&state, Method::POST, "/delete", FORM, "name=C1").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, Method::POST, "/read", FORM, "name=C1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_create_missing_fields_is_bad_request() {
        let (state, _) = ready_state();
        let (status, body) = call(&state, Method::POST, "/create", JSON, r#"{"name":"C1"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["msg"].as_str().unwrap().contains("startdate"));
    }

    #[tokio::test]
    async fn test_querylocation_requires_location() {
        let (state, _) = ready_state();
        let (status, _) = call(&state, Method::POST, "/querylocation", JSON, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_index_on_fresh_store() {
        let (state, _) = ready_state();
        let (status, body) = call(&state, Method::POST, "/index", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_graphinit_sets_schema() {
        let (state, graph) = ready_state();
        let (status, _) = call(&state, Method::GET, "/graphinit", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graph.schema().await, Some(GraphSchema::contracts()));
    }

    #[tokio::test]
    async fn test_chainstats_passthrough() {
        let (state, _) = ready_state();
        let (status, body) = call(&state, Method::GET, "/chainstats", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["height"].is_number());
    }

    #[tokio::test]
    async fn test_routes_refused_until_ready() {
        let state = Arc::new(AppState::new(
            Args::parse_from(["contract-gateway", "--dev-mode"]),
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryGraph::new()),
        ));
        let (status, body) = call(&state, Method::POST, "/index", None, "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], 503);

        let (status, _) = call(&state, Method::POST, "/nowhere", None, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
