//! HTTP routes for the contract gateway

pub mod api;
pub mod health;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use crate::types::GatewayError;

pub use api::handle_api_request;
pub use health::{health_check, readiness_check, version_info};

/// JSON response with the CORS header every endpoint carries
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"msg":"Serialization failed","status":500}"#.to_vec());

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Error body: `{msg, status}`, with the HTTP status matching `status`
pub fn error_response(err: &GatewayError) -> Response<Full<Bytes>> {
    let status = err.status();
    if err.is_server_error() {
        error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        debug!(status = status.as_u16(), error = %err, "Request rejected");
    }

    let body = serde_json::json!({
        "msg": err.public_message(),
        "status": status.as_u16(),
    });
    json_response(status, &body)
}
