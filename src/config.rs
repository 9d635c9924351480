//! Configuration for the contract gateway
//!
//! CLI arguments and environment variable handling using clap, plus
//! discovery of platform-injected service credentials (`VCAP_SERVICES`).

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{GatewayError, Result};

/// Largest fan-out allowed for per-record fetches in location queries
pub const MAX_QUERY_CONCURRENCY: usize = 8;

/// Contract gateway - REST front door for ledger-backed contract records
#[derive(Parser, Debug, Clone)]
#[command(name = "contract-gateway")]
#[command(about = "Readiness-gated REST gateway for ledger contracts with a graph mirror")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Path prefix for the record API
    #[arg(long, env = "API_PREFIX", default_value = "/api")]
    pub api_prefix: String,

    /// Ledger peer REST endpoint
    #[arg(long, env = "LEDGER_URL", default_value = "http://localhost:7050")]
    pub ledger_url: String,

    /// Deployed chaincode name
    #[arg(long, env = "CHAINCODE_ID", default_value = "contracts")]
    pub chaincode_id: String,

    /// Enrollment id sent as the secure context of chaincode calls
    #[arg(long, env = "LEDGER_USER")]
    pub ledger_user: Option<String>,

    /// Graph API base URL
    #[arg(long, env = "GRAPH_API_URL", default_value = "http://localhost:8182")]
    pub graph_api_url: String,

    /// Graph name holding the relationship mirror
    #[arg(long, env = "GRAPH_NAME", default_value = "contract")]
    pub graph_name: String,

    /// Graph API username
    #[arg(long, env = "GRAPH_USERNAME")]
    pub graph_username: Option<String>,

    /// Graph API password
    #[arg(long, env = "GRAPH_PASSWORD")]
    pub graph_password: Option<String>,

    /// Platform service credentials (JSON)
    #[arg(long, env = "VCAP_SERVICES", hide_env_values = true)]
    pub vcap_services: Option<String>,

    /// Maximum number of preflight readiness checks
    #[arg(long, env = "PREFLIGHT_MAX_ATTEMPTS", default_value = "15")]
    pub preflight_max_attempts: u32,

    /// Seconds between preflight readiness checks
    #[arg(long, env = "PREFLIGHT_INTERVAL_SECS", default_value = "10")]
    pub preflight_interval_secs: u64,

    /// Deadline for every outbound ledger/graph call in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Concurrent record fetches per location query
    #[arg(long, env = "QUERY_CONCURRENCY", default_value = "4")]
    pub query_concurrency: usize,

    /// Run against in-memory ledger and graph stores
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn preflight_interval(&self) -> Duration {
        Duration::from_secs(self.preflight_interval_secs)
    }

    /// Normalized API prefix: leading slash, no trailing slash ("" for root)
    pub fn api_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.preflight_max_attempts == 0 {
            return Err("PREFLIGHT_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than 0".to_string());
        }
        if self.query_concurrency == 0 || self.query_concurrency > MAX_QUERY_CONCURRENCY {
            return Err(format!(
                "QUERY_CONCURRENCY must be between 1 and {}",
                MAX_QUERY_CONCURRENCY
            ));
        }
        if let Some(ref raw) = self.vcap_services {
            VcapCredentials::parse(raw).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Resolve ledger connection settings, letting platform credentials win
    pub fn ledger_endpoint(&self) -> Result<LedgerEndpoint> {
        let discovered = self.vcap()?.and_then(|v| v.ledger);
        Ok(match discovered {
            Some(ledger) => {
                info!(url = %ledger.url, "Using ledger peer from VCAP_SERVICES");
                LedgerEndpoint {
                    url: ledger.url,
                    chaincode_id: self.chaincode_id.clone(),
                    enroll_id: ledger.enroll_id.or_else(|| self.ledger_user.clone()),
                }
            }
            None => LedgerEndpoint {
                url: self.ledger_url.trim_end_matches('/').to_string(),
                chaincode_id: self.chaincode_id.clone(),
                enroll_id: self.ledger_user.clone(),
            },
        })
    }

    /// Resolve graph connection settings, letting platform credentials win
    pub fn graph_endpoint(&self) -> Result<GraphEndpoint> {
        let discovered = self.vcap()?.and_then(|v| v.graph);
        let (api_url, username, password) = match discovered {
            Some(graph) => {
                info!(url = %graph.api_url, "Using graph service from VCAP_SERVICES");
                (graph.api_url, graph.username, graph.password)
            }
            None => (
                self.graph_api_url.clone(),
                self.graph_username.clone(),
                self.graph_password.clone(),
            ),
        };
        Ok(GraphEndpoint {
            api_base: graph_api_base(&api_url),
            graph_name: self.graph_name.clone(),
            username,
            password,
        })
    }

    fn vcap(&self) -> Result<Option<VcapCredentials>> {
        self.vcap_services
            .as_deref()
            .map(VcapCredentials::parse)
            .transpose()
    }
}

/// Resolved ledger peer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEndpoint {
    pub url: String,
    pub chaincode_id: String,
    pub enroll_id: Option<String>,
}

/// Resolved graph API settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoint {
    /// API root, without the graph name segment
    pub api_base: String,
    pub graph_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Platform service credentials hosted API URLs point at a default graph
/// (`.../g`); strip that last segment so the configured graph can be used.
fn graph_api_base(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((base, last)) if last == "g" => base.to_string(),
        _ => trimmed.to_string(),
    }
}

// =============================================================================
// VCAP_SERVICES
// =============================================================================

/// Credentials discovered from `VCAP_SERVICES`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcapCredentials {
    pub ledger: Option<DiscoveredLedger>,
    pub graph: Option<DiscoveredGraph>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLedger {
    /// Peer REST URL; https when the peer advertises a TLS port
    pub url: String,
    /// First eligible enrollment id (type1 users preferred)
    pub enroll_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGraph {
    pub api_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceInstance {
    #[serde(default)]
    credentials: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PeerCredentials {
    api_host: String,
    #[serde(default)]
    api_port: Option<Value>,
    #[serde(default)]
    api_port_tls: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UserCredentials {
    #[serde(rename = "enrollId")]
    enroll_id: String,
}

#[derive(Debug, Deserialize)]
struct GraphCredentials {
    #[serde(rename = "apiURL")]
    api_url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl VcapCredentials {
    /// Parse the `VCAP_SERVICES` JSON document.
    ///
    /// Services whose key contains `ibm-blockchain` provide the ledger peer
    /// (first peer only) and users; services whose key contains `IBM Graph`
    /// provide the graph API. Unrelated services are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let services: std::collections::BTreeMap<String, Vec<ServiceInstance>> =
            serde_json::from_str(raw)
                .map_err(|e| GatewayError::Config(format!("Invalid VCAP_SERVICES: {}", e)))?;

        let mut creds = VcapCredentials::default();
        for (key, instances) in services {
            let Some(credentials) = instances.into_iter().next().and_then(|i| i.credentials)
            else {
                continue;
            };

            if key.contains("ibm-blockchain") {
                if let Some(ledger) = parse_ledger_credentials(&key, credentials)? {
                    creds.ledger = Some(ledger);
                }
            } else if key.contains("IBM Graph") {
                let graph: GraphCredentials = serde_json::from_value(credentials).map_err(|e| {
                    GatewayError::Config(format!("Invalid graph credentials in {}: {}", key, e))
                })?;
                creds.graph = Some(DiscoveredGraph {
                    api_url: graph.api_url,
                    username: graph.username,
                    password: graph.password,
                });
            }
        }
        Ok(creds)
    }
}

fn parse_ledger_credentials(key: &str, credentials: Value) -> Result<Option<DiscoveredLedger>> {
    let Some(peers) = credentials.get("peers").cloned() else {
        return Ok(None);
    };
    let peers: Vec<PeerCredentials> = serde_json::from_value(peers)
        .map_err(|e| GatewayError::Config(format!("Invalid peers in {}: {}", key, e)))?;
    let Some(peer) = peers.into_iter().next() else {
        return Ok(None);
    };

    let users: Vec<UserCredentials> = match credentials.get("users") {
        Some(users) if !users.is_null() => serde_json::from_value(users.clone())
            .map_err(|e| GatewayError::Config(format!("Invalid users in {}: {}", key, e)))?,
        _ => Vec::new(),
    };
    let users = prefer_type1_users(users.into_iter().map(|u| u.enroll_id).collect());

    let (scheme, port) = match peer.api_port_tls.as_ref().and_then(port_number) {
        Some(port) => ("https", Some(port)),
        None => ("http", peer.api_port.as_ref().and_then(port_number)),
    };
    let url = match port {
        Some(port) => format!("{}://{}:{}", scheme, peer.api_host, port),
        None => format!("{}://{}", scheme, peer.api_host),
    };

    if users.len() > 1 {
        debug!(eligible = users.len(), "Multiple ledger enrollments available, using the first");
    }

    Ok(Some(DiscoveredLedger {
        url,
        enroll_id: users.into_iter().next(),
    }))
}

/// Keep only `type1` enrollments when any exist
fn prefer_type1_users(users: Vec<String>) -> Vec<String> {
    let type1: Vec<String> = users.iter().filter(|u| u.contains("type1")).cloned().collect();
    if type1.is_empty() {
        users
    } else {
        type1
    }
}

fn port_number(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["contract-gateway"])
    }

    const VCAP: &str = r#"{
        "ibm-blockchain-5-prod": [{
            "credentials": {
                "peers": [
                    {"api_host": "peer0.example.net", "api_port": 80, "api_port_tls": 443},
                    {"api_host": "peer1.example.net", "api_port": 80, "api_port_tls": 443}
                ],
                "users": [
                    {"enrollId": "admin"},
                    {"enrollId": "user_type1_0"},
                    {"enrollId": "user_type1_1"}
                ]
            }
        }],
        "IBM Graph": [{
            "credentials": {
                "apiURL": "https://graph.example.net/api/v1/svc-123/g",
                "username": "graph-user",
                "password": "graph-pass"
            }
        }],
        "cloudantNoSQLDB": [{"credentials": {"url": "https://db.example.net"}}]
    }"#;

    #[test]
    fn test_default_args() {
        let args = base_args();
        assert_eq!(args.preflight_max_attempts, 15);
        assert_eq!(args.preflight_interval(), Duration::from_secs(10));
        assert_eq!(args.request_timeout(), Duration::from_secs(10));
        assert_eq!(args.query_concurrency, 4);
        assert_eq!(args.api_prefix(), "/api");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_api_prefix_normalization() {
        let mut args = base_args();
        args.api_prefix = "v1/".to_string();
        assert_eq!(args.api_prefix(), "/v1");
        args.api_prefix = "/".to_string();
        assert_eq!(args.api_prefix(), "");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut args = base_args();
        args.query_concurrency = MAX_QUERY_CONCURRENCY + 1;
        assert!(args.validate().is_err());

        let mut args = base_args();
        args.preflight_max_attempts = 0;
        assert!(args.validate().is_err());

        let mut args = base_args();
        args.vcap_services = Some("not json".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_vcap_parse() {
        let creds = VcapCredentials::parse(VCAP).unwrap();

        let ledger = creds.ledger.unwrap();
        assert_eq!(ledger.url, "https://peer0.example.net:443");
        assert_eq!(ledger.enroll_id.as_deref(), Some("user_type1_0"));

        let graph = creds.graph.unwrap();
        assert_eq!(graph.username.as_deref(), Some("graph-user"));
    }

    #[test]
    fn test_vcap_without_tls_port_uses_http() {
        let raw = r#"{"ibm-blockchain": [{"credentials": {
            "peers": [{"api_host": "peer0", "api_port": "7050", "api_port_tls": "n/a"}],
            "users": null
        }}]}"#;
        let ledger = VcapCredentials::parse(raw).unwrap().ledger.unwrap();
        assert_eq!(ledger.url, "http://peer0:7050");
        assert!(ledger.enroll_id.is_none());
    }

    #[test]
    fn test_prefer_type1_falls_back_to_all() {
        let users = vec!["admin".to_string(), "auditor".to_string()];
        assert_eq!(prefer_type1_users(users.clone()), users);
    }

    #[test]
    fn test_endpoints_prefer_vcap() {
        let mut args = base_args();
        args.ledger_user = Some("local-user".to_string());
        args.vcap_services = Some(VCAP.to_string());

        let ledger = args.ledger_endpoint().unwrap();
        assert_eq!(ledger.url, "https://peer0.example.net:443");
        assert_eq!(ledger.enroll_id.as_deref(), Some("user_type1_0"));

        let graph = args.graph_endpoint().unwrap();
        assert_eq!(graph.api_base, "https://graph.example.net/api/v1/svc-123");
        assert_eq!(graph.graph_name, "contract");
    }

    #[test]
    fn test_endpoints_from_flags() {
        let args = base_args();
        let ledger = args.ledger_endpoint().unwrap();
        assert_eq!(ledger.url, "http://localhost:7050");
        assert_eq!(ledger.chaincode_id, "contracts");

        let graph = args.graph_endpoint().unwrap();
        assert_eq!(graph.api_base, "http://localhost:8182");
        assert!(graph.username.is_none());
    }
}
