//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Operational endpoints are
//! answered directly; everything under the API prefix goes to
//! [`routes::handle_api_request`].

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, VARY};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::graph::GraphStore;
use crate::ledger::LedgerClient;
use crate::mirror::{QueryMirror, RelationshipMirror};
use crate::readiness::ReadinessGate;
use crate::records::RecordGateway;
use crate::routes::{self, json_response};
use crate::types::{GatewayError, Result};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Smallest JSON body worth compressing
const COMPRESSION_THRESHOLD: usize = 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Normalized API prefix ("" when mounted at the root)
    pub api_prefix: String,
    /// Record operations against the ledger
    pub records: Arc<RecordGateway>,
    /// Location queries through the graph mirror
    pub query: QueryMirror,
    /// Graph store, used directly for schema setup
    pub graph: Arc<dyn GraphStore>,
    /// Startup gate; API routes answer 503 until it opens
    pub readiness: Arc<ReadinessGate>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the gateway over the given collaborators. The readiness gate
    /// starts closed.
    pub fn new(args: Args, ledger: Arc<dyn LedgerClient>, graph: Arc<dyn GraphStore>) -> Self {
        let deadline = args.request_timeout();
        let mirror = Arc::new(RelationshipMirror::new(Arc::clone(&graph), deadline));
        let records = Arc::new(RecordGateway::new(ledger, mirror, deadline));
        let query = QueryMirror::new(
            Arc::clone(&graph),
            Arc::clone(&records),
            args.query_concurrency,
            deadline,
        );

        Self {
            api_prefix: args.api_prefix(),
            args,
            records,
            query,
            graph,
            readiness: Arc::new(ReadinessGate::new()),
            started_at: Instant::now(),
        }
    }

    pub fn with_readiness(mut self, readiness: Arc<ReadinessGate>) -> Self {
        self.readiness = readiness;
        self
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    serve(listener, state).await
}

/// Serve connections from an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let local = listener.local_addr()?;
    info!(
        "Contract gateway listening on {} as node {} (api prefix {:?})",
        local, state.args.node_id, state.api_prefix
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - using in-memory ledger and graph");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the request and hand it to [`dispatch`]
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let gzip = accepts_gzip(req.headers());

    info!("[{}] {} {}", addr, method, path);

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("[{}] failed to read request body: {}", addr, e);
            let err = GatewayError::Validation(format!("Unreadable request body: {}", e));
            return Ok(to_boxed(routes::error_response(&err)));
        }
    };
    if !body.is_empty() {
        debug!("[{}] body: {}", addr, String::from_utf8_lossy(&body));
    }

    let response = dispatch(state, &method, &path, content_type.as_deref(), body).await;
    Ok(to_boxed(encode_response(response, gzip).await))
}

/// True when the client lists gzip in `Accept-Encoding` without `q=0`
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| {
            let mut parts = coding.split(';').map(str::trim);
            let name = parts.next().unwrap_or("");
            let refused = parts.any(|p| p.replace(' ', "") == "q=0");
            (name.eq_ignore_ascii_case("gzip") || name == "*") && !refused
        })
}

/// Gzip JSON bodies above the threshold when the client accepts it
async fn encode_response(response: Response<Full<Bytes>>, gzip: bool) -> Response<Full<Bytes>> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);
    if !gzip || !is_json {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };
    if bytes.len() < COMPRESSION_THRESHOLD {
        return Response::from_parts(parts, Full::new(bytes));
    }

    match gzip_bytes(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts
                .headers
                .insert(VARY, HeaderValue::from_static("Accept-Encoding"));
            Response::from_parts(parts, Full::new(Bytes::from(compressed)))
        }
        Err(e) => {
            warn!("Response compression failed, sending identity: {}", e);
            Response::from_parts(parts, Full::new(bytes))
        }
    }
}

fn gzip_bytes(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Route a fully read request
pub async fn dispatch(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    match (method, path) {
        // Liveness check - 200 whenever the process is serving
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(&state),

        // Readiness check - 200 only after the preflight gate opens
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => routes::readiness_check(&state),

        (&Method::GET, "/version") => routes::version_info(),

        (&Method::OPTIONS, _) => preflight_response(),

        _ => match api_route(&state.api_prefix, path) {
            Some(route) => {
                routes::handle_api_request(state, method, route, content_type, body).await
            }
            None => not_found_response(path),
        },
    }
}

/// Path relative to the API prefix, if the request falls under it
fn api_route<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

/// Not found response
pub(crate) fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "msg": format!("Not Found: {}", path),
        "status": StatusCode::NOT_FOUND.as_u16(),
    });
    json_response(StatusCode::NOT_FOUND, &body)
}
