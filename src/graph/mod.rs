//! Graph store client for the relationship mirror
//!
//! The graph holds a derived projection of contract relationships:
//!
//! ```text
//!            parties          locations
//!   party ◄────────── contract ──────────► location
//!   party ◄──────────┘
//! ```
//!
//! Writes and traversals are gremlin scripts with bindings; values are never
//! spliced into script text.

pub mod http;
pub mod memory;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::types::Result;

pub use http::HttpGraphClient;
pub use memory::InMemoryGraph;
pub use schema::GraphSchema;

/// Gremlin scripts issued by the gateway
pub mod scripts {
    /// Adds two parties, a contract and a location, plus the three edges.
    ///
    /// Bindings: `party1`, `party2`, `contractName`, `hash`, `title`, `location`.
    pub const ADD_CONTRACT: &str = "\
def party1 = graph.addVertex(T.label, 'party', 'name', party1);\
def party2 = graph.addVertex(T.label, 'party', 'name', party2);\
def contract = graph.addVertex(T.label, 'contract', 'name', contractName, 'hash', hash, 'title', title);\
def location = graph.addVertex(T.label, 'location', 'location', location);\
contract.addEdge('parties', party1);\
contract.addEdge('parties', party2);\
contract.addEdge('locations', location);";

    /// Out-vertices of every edge touching the matching location vertex.
    ///
    /// Bindings: `location`.
    pub const CONTRACTS_AT_LOCATION: &str =
        "graph.traversal().V().has('location', location).bothE().outV();";
}

/// Vertex labels
pub mod labels {
    pub const PARTY: &str = "party";
    pub const CONTRACT: &str = "contract";
    pub const LOCATION: &str = "location";
    pub const PARTIES_EDGE: &str = "parties";
    pub const LOCATIONS_EDGE: &str = "locations";
}

/// A gremlin script plus its bindings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GremlinQuery {
    pub gremlin: String,
    pub bindings: Map<String, Value>,
}

impl GremlinQuery {
    pub fn new(gremlin: &str) -> Self {
        Self {
            gremlin: gremlin.to_string(),
            bindings: Map::new(),
        }
    }

    pub fn bind(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.bindings.insert(key.to_string(), value.into());
        self
    }

    /// String binding, if present
    pub fn binding_str(&self, key: &str) -> Option<&str> {
        self.bindings.get(key).and_then(Value::as_str)
    }
}

/// Graph API response envelope
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GremlinResponse {
    #[serde(default)]
    pub result: GremlinResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GremlinStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GremlinResult {
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GremlinStatus {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Vertex as returned in `result.data`
#[derive(Debug, Clone, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<VertexProperty>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VertexProperty {
    #[serde(default)]
    pub value: Value,
}

impl Vertex {
    /// First value of a string property
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|values| values.first())
            .and_then(|p| p.value.as_str())
    }
}

/// Trait for graph access (allows mocking in tests)
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create or extend the graph schema
    async fn set_schema(&self, schema: &GraphSchema) -> Result<Value>;

    /// Execute a gremlin script
    async fn gremlin(&self, query: &GremlinQuery) -> Result<GremlinResponse>;
}
