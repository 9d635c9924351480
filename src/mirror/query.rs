//! Location queries through the graph mirror
//!
//! The graph only supplies candidate names. Records themselves always come
//! from the ledger, fetched with a bounded fan-out.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::MAX_QUERY_CONCURRENCY;
use crate::graph::{labels, scripts, GraphStore, GremlinQuery, GremlinResponse, Vertex};
use crate::records::{RecordFields, RecordGateway};
use crate::types::{with_deadline, GatewayError, Result};

/// Answers relationship queries via graph traversal plus ledger reads
pub struct QueryMirror {
    graph: Arc<dyn GraphStore>,
    records: Arc<RecordGateway>,
    concurrency: usize,
    deadline: Duration,
}

impl QueryMirror {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        records: Arc<RecordGateway>,
        concurrency: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            graph,
            records,
            concurrency: concurrency.clamp(1, MAX_QUERY_CONCURRENCY),
            deadline,
        }
    }

    /// Contract names in traversal order, without duplicates
    pub fn contract_names(response: &GremlinResponse) -> Vec<String> {
        let mut seen = BTreeSet::new();
        response
            .result
            .data
            .iter()
            .filter_map(|value| serde_json::from_value::<Vertex>(value.clone()).ok())
            .filter(|vertex| vertex.label == labels::CONTRACT)
            .filter_map(|vertex| vertex.property_str("name").map(str::to_string))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// All records linked to `location`, keyed by record name.
    ///
    /// A failing traversal fails the query. A record that cannot be read
    /// (missing, malformed, timed out) is left out of the result.
    pub async fn query_by_location(&self, location: &str) -> Result<BTreeMap<String, RecordFields>> {
        if location.trim().is_empty() {
            return Err(GatewayError::Validation("location must not be blank".into()));
        }

        let traversal = GremlinQuery::new(scripts::CONTRACTS_AT_LOCATION).bind("location", location);
        let response = with_deadline(
            self.deadline,
            "graph location traversal",
            self.graph.gremlin(&traversal),
        )
        .await?;

        let names = Self::contract_names(&response);
        debug!(location, candidates = names.len(), "Location traversal complete");

        let fetched: Vec<(String, Result<RecordFields>)> = stream::iter(names)
            .map(|name| async move {
                let record = self.records.read(&name).await;
                (name, record)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut results = BTreeMap::new();
        for (name, record) in fetched {
            match record {
                Ok(record) => {
                    results.insert(name, record);
                }
                Err(e) => {
                    warn!(location, name = %name, error = %e, "Skipping record in location query");
                }
            }
        }

        info!(location, found = results.len(), "Location query answered");
        Ok(results)
    }
}
