//! Ledger peer REST client
//!
//! Chaincode calls go to `POST {peer}/chaincode` as JSON-RPC 2.0:
//!
//! ```text
//! {"jsonrpc": "2.0", "method": "query",
//!  "params": {"type": 1, "chaincodeID": {"name": "contracts"},
//!             "ctorMsg": {"function": "read", "args": ["C1"]},
//!             "secureContext": "user_type1_0"},
//!  "id": 7}
//! ```
//!
//! `result.message` is the query payload or, for invokes, the transaction id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{InvokeReceipt, LedgerClient};
use crate::config::LedgerEndpoint;
use crate::types::{GatewayError, Result};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: RpcParams<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(rename = "chaincodeID")]
    chaincode_id: ChaincodeId<'a>,
    #[serde(rename = "ctorMsg")]
    ctor_msg: CtorMsg<'a>,
    #[serde(rename = "secureContext", skip_serializing_if = "Option::is_none")]
    secure_context: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChaincodeId<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CtorMsg<'a> {
    function: &'a str,
    args: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<RpcResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Ledger client talking to a single peer
pub struct HttpLedgerClient {
    endpoint: LedgerEndpoint,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpLedgerClient {
    pub fn new(endpoint: LedgerEndpoint, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contract-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build ledger client: {}", e)))?;

        Ok(Self {
            endpoint,
            http_client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, function: &str, args: &[String]) -> Result<RpcResult> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params: RpcParams {
                kind: 1,
                chaincode_id: ChaincodeId {
                    name: &self.endpoint.chaincode_id,
                },
                ctor_msg: CtorMsg { function, args },
                secure_context: self.endpoint.enroll_id.as_deref(),
            },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let url = format!("{}/chaincode", self.endpoint.url);
        debug!(%url, method, function, "Ledger call");

        let response = self.http_client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let rpc = decode_rpc(status, &body)?;

        if let Some(error) = rpc.error {
            return Err(map_rpc_error(function, error));
        }

        match rpc.result {
            Some(result) => {
                if let Some(ref s) = result.status {
                    if !s.eq_ignore_ascii_case("ok") {
                        warn!(function, status = %s, "Ledger returned non-OK status");
                    }
                }
                Ok(result)
            }
            None => Err(GatewayError::BackingStoreCorruption(
                "JSON-RPC response has neither result nor error".to_string(),
            )),
        }
    }
}

/// Decode a JSON-RPC reply. A body that is not JSON-RPC is corruption only
/// when the peer claimed success; otherwise the peer (or a proxy) failed.
fn decode_rpc(status: reqwest::StatusCode, body: &[u8]) -> Result<RpcResponse> {
    serde_json::from_slice(body).map_err(|e| {
        if status.is_success() {
            GatewayError::BackingStoreCorruption(format!(
                "Unreadable JSON-RPC response (HTTP {}): {}",
                status, e
            ))
        } else {
            GatewayError::Backend(format!("Ledger peer returned HTTP {}", status))
        }
    })
}

/// Chaincode duplicate rejections; the deployed chaincode spells it "arleady"
const DUPLICATE_MARKERS: [&str; 2] = ["already exists", "arleady exists"];

fn map_rpc_error(function: &str, error: RpcError) -> GatewayError {
    let detail = match error.data {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let text = format!("{} (code {}): {} {}", function, error.code, error.message, detail);
    let lowered = text.to_ascii_lowercase();
    if DUPLICATE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        GatewayError::AlreadyExists(text)
    } else {
        GatewayError::Backend(text)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn invoke(&self, function: &str, args: &[String]) -> Result<InvokeReceipt> {
        let result = self.call("invoke", function, args).await?;
        Ok(InvokeReceipt {
            tx_id: result.message.filter(|m| !m.is_empty()),
        })
    }

    async fn query(&self, function: &str, args: &[String]) -> Result<String> {
        let result = self.call("query", function, args).await?;
        Ok(result.message.unwrap_or_default())
    }

    async fn chain_stats(&self) -> Result<Value> {
        let url = format!("{}/chain", self.endpoint.url);
        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::Backend(format!(
                "Chain stats request failed: HTTP {}",
                response.status()
            )));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| GatewayError::BackingStoreCorruption(format!("Chain stats: {}", e)))
    }
}
