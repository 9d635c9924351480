//! In-memory graph understanding the gateway's own gremlin scripts
//!
//! Only [`scripts::ADD_CONTRACT`] and [`scripts::CONTRACTS_AT_LOCATION`] are
//! executed; any other script is rejected. Like the hosted graph, every
//! `addVertex` creates a new vertex, so repeated locations yield separate
//! location vertices.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{labels, scripts, GraphSchema, GraphStore, GremlinQuery, GremlinResponse, GremlinResult};
use crate::types::{GatewayError, Result};

#[derive(Debug, Clone)]
struct MemVertex {
    id: u64,
    label: &'static str,
    properties: BTreeMap<&'static str, String>,
}

impl MemVertex {
    fn to_json(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    json!([{ "id": format!("{}-{}", self.id, k), "value": v }]),
                )
            })
            .collect();
        json!({
            "id": self.id,
            "label": self.label,
            "type": "vertex",
            "properties": properties,
        })
    }
}

#[derive(Debug, Clone)]
struct MemEdge {
    out_v: u64,
    in_v: u64,
}

#[derive(Debug, Default)]
struct GraphData {
    vertices: Vec<MemVertex>,
    edges: Vec<MemEdge>,
    schema: Option<GraphSchema>,
    next_id: u64,
}

impl GraphData {
    fn add_vertex(&mut self, label: &'static str, properties: &[(&'static str, &str)]) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.vertices.push(MemVertex {
            id,
            label,
            properties: properties
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect(),
        });
        id
    }

    fn vertex(&self, id: u64) -> Option<&MemVertex> {
        self.vertices.iter().find(|v| v.id == id)
    }
}

/// Graph store held in memory
#[derive(Default)]
pub struct InMemoryGraph {
    data: RwLock<GraphData>,
}

fn required<'a>(query: &'a GremlinQuery, key: &str) -> Result<&'a str> {
    query
        .binding_str(key)
        .ok_or_else(|| GatewayError::Backend(format!("Missing gremlin binding: {}", key)))
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn vertex_count(&self, label: &str) -> usize {
        self.data
            .read()
            .await
            .vertices
            .iter()
            .filter(|v| v.label == label)
            .count()
    }

    pub async fn edge_count(&self) -> usize {
        self.data.read().await.edges.len()
    }

    pub async fn schema(&self) -> Option<GraphSchema> {
        self.data.read().await.schema.clone()
    }

    async fn add_contract(&self, query: &GremlinQuery) -> Result<Vec<Value>> {
        let party1 = required(query, "party1")?;
        let party2 = required(query, "party2")?;
        let name = required(query, "contractName")?;
        let hash = required(query, "hash")?;
        let title = required(query, "title")?;
        let location = required(query, "location")?;

        let mut data = self.data.write().await;
        let p1 = data.add_vertex(labels::PARTY, &[("name", party1)]);
        let p2 = data.add_vertex(labels::PARTY, &[("name", party2)]);
        let contract = data.add_vertex(
            labels::CONTRACT,
            &[("name", name), ("hash", hash), ("title", title)],
        );
        let loc = data.add_vertex(labels::LOCATION, &[("location", location)]);

        for in_v in [p1, p2, loc] {
            data.edges.push(MemEdge {
                out_v: contract,
                in_v,
            });
        }

        Ok(Vec::new())
    }

    async fn contracts_at_location(&self, query: &GremlinQuery) -> Result<Vec<Value>> {
        let location = required(query, "location")?;
        let data = self.data.read().await;

        let mut out = Vec::new();
        for vertex in data
            .vertices
            .iter()
            .filter(|v| v.properties.get("location").map(String::as_str) == Some(location))
        {
            for edge in data
                .edges
                .iter()
                .filter(|e| e.out_v == vertex.id || e.in_v == vertex.id)
            {
                if let Some(out_v) = data.vertex(edge.out_v) {
                    out.push(out_v.to_json());
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn set_schema(&self, schema: &GraphSchema) -> Result<Value> {
        self.data.write().await.schema = Some(schema.clone());
        let schema = serde_json::to_value(schema)
            .map_err(|e| GatewayError::Internal(format!("Schema encoding failed: {}", e)))?;
        Ok(json!({
            "result": { "data": [schema] },
            "status": { "code": 200, "message": "" },
        }))
    }

    async fn gremlin(&self, query: &GremlinQuery) -> Result<GremlinResponse> {
        let data = match query.gremlin.as_str() {
            scripts::ADD_CONTRACT => self.add_contract(query).await?,
            scripts::CONTRACTS_AT_LOCATION => self.contracts_at_location(query).await?,
            other => {
                return Err(GatewayError::Backend(format!(
                    "Unsupported gremlin script: {}",
                    other
                )))
            }
        };
        Ok(GremlinResponse {
            result: GremlinResult { data },
            status: None,
        })
    }
}
