//! Hosted graph API client
//!
//! Authenticates once with basic auth at `{api_base}/_session`, then sends
//! the returned token as `Authorization: gds-token <token>`. A rejected token
//! is dropped and the request retried once with a fresh session.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{GraphSchema, GraphStore, GremlinQuery, GremlinResponse};
use crate::config::GraphEndpoint;
use crate::types::{GatewayError, Result};

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(rename = "gds-token")]
    token: String,
}

/// Graph client bound to a single named graph
pub struct HttpGraphClient {
    endpoint: GraphEndpoint,
    http_client: reqwest::Client,
    session: RwLock<Option<String>>,
}

impl HttpGraphClient {
    pub fn new(endpoint: GraphEndpoint, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contract-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build graph client: {}", e)))?;

        Ok(Self {
            endpoint,
            http_client,
            session: RwLock::new(None),
        })
    }

    fn graph_url(&self, resource: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.api_base, self.endpoint.graph_name, resource
        )
    }

    /// Session token, fetched on first use. `None` when no credentials are set.
    async fn session_token(&self) -> Result<Option<String>> {
        let Some(ref username) = self.endpoint.username else {
            return Ok(None);
        };

        if let Some(token) = self.session.read().await.clone() {
            return Ok(Some(token));
        }

        let mut session = self.session.write().await;
        if let Some(token) = session.clone() {
            return Ok(Some(token));
        }

        let url = format!("{}/_session", self.endpoint.api_base);
        let response = self
            .http_client
            .get(&url)
            .basic_auth(username, self.endpoint.password.as_deref())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Backend(format!(
                "Graph session request failed: HTTP {}",
                response.status()
            )));
        }
        let body: SessionResponse = response.json().await?;
        info!(graph = %self.endpoint.graph_name, "Graph session established");
        *session = Some(body.token.clone());
        Ok(Some(body.token))
    }

    async fn post<B: Serialize + Sync>(&self, resource: &str, body: &B) -> Result<Value> {
        let url = self.graph_url(resource);
        let mut retried = false;

        loop {
            let mut request = self.http_client.post(&url).json(body);
            if let Some(token) = self.session_token().await? {
                request = request.header("Authorization", format!("gds-token {}", token));
            }

            debug!(%url, "Graph request");
            let response = request.send().await?;
            let status = response.status();

            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) && !retried {
                warn!(%url, %status, "Graph session rejected, re-authenticating");
                *self.session.write().await = None;
                retried = true;
                continue;
            }

            let bytes = response.bytes().await?;
            if !status.is_success() {
                let detail = String::from_utf8_lossy(&bytes);
                return Err(GatewayError::Backend(format!(
                    "Graph request to {} failed: HTTP {} {}",
                    resource, status, detail
                )));
            }
            return serde_json::from_slice(&bytes).map_err(|e| {
                GatewayError::Backend(format!("Unreadable graph response from {}: {}", resource, e))
            });
        }
    }
}

#[async_trait]
impl GraphStore for HttpGraphClient {
    async fn set_schema(&self, schema: &GraphSchema) -> Result<Value> {
        self.post("schema", schema).await
    }

    async fn gremlin(&self, query: &GremlinQuery) -> Result<GremlinResponse> {
        let value = self.post("gremlin", query).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::Backend(format!("Unexpected gremlin response: {}", e)))
    }
}
