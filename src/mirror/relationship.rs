//! Relationship mirror writes

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MirrorStats, MirrorStatsSnapshot};
use crate::graph::{scripts, GraphStore, GremlinQuery};
use crate::records::RecordFields;
use crate::types::{with_deadline, GatewayError, Result};

/// Hex md5 of the contract text, stored on the contract vertex as a
/// tamper-evidence fingerprint
pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Projects created records into the graph
pub struct RelationshipMirror {
    graph: Arc<dyn GraphStore>,
    deadline: Duration,
    stats: MirrorStats,
}

impl RelationshipMirror {
    pub fn new(graph: Arc<dyn GraphStore>, deadline: Duration) -> Self {
        Self {
            graph,
            deadline,
            stats: MirrorStats::default(),
        }
    }

    /// Gremlin write for one record: two parties, a contract, a location
    /// and the three edges joining them
    pub fn build_query(fields: &RecordFields) -> GremlinQuery {
        GremlinQuery::new(scripts::ADD_CONTRACT)
            .bind("party1", fields.party1.as_str())
            .bind("party2", fields.party2.as_str())
            .bind("contractName", fields.name.as_str())
            .bind("hash", content_hash(&fields.text))
            .bind("title", fields.title.as_str())
            .bind("location", fields.location.as_str())
    }

    /// Write the record's relationships to the graph.
    ///
    /// Failures come back as `MirrorWriteFailure` and are counted; callers
    /// treat them as lag, not as a failed create.
    pub async fn mirror_create(&self, fields: &RecordFields) -> Result<()> {
        let query = Self::build_query(fields);
        let result = with_deadline(self.deadline, "graph mirror write", self.graph.gremlin(&query))
            .await;

        match result {
            Ok(_) => {
                self.stats.record_success();
                debug!(name = %fields.name, "Relationship mirror written");
                Ok(())
            }
            Err(e) => {
                let message = format!("{}: {}", fields.name, e);
                warn!(name = %fields.name, error = %e, "Relationship mirror write failed");
                self.stats.record_failure(&message);
                Err(GatewayError::MirrorWriteFailure(message))
            }
        }
    }

    pub fn stats(&self) -> MirrorStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{labels, InMemoryGraph};

    fn record() -> RecordFields {
        RecordFields {
            name: "C1".into(),
            location: "NYC".into(),
            text: "hello".into(),
            party1: "A".into(),
            party2: "B".into(),
            title: "T".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_content_hash_is_md5_hex() {
        assert_eq!(content_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_build_query_bindings() {
        let query = RelationshipMirror::build_query(&record());
        assert_eq!(query.gremlin, scripts::ADD_CONTRACT);
        assert_eq!(query.binding_str("contractName"), Some("C1"));
        assert_eq!(query.binding_str("party2"), Some("B"));
        assert_eq!(query.binding_str("location"), Some("NYC"));
        assert_eq!(query.binding_str("hash"), Some("5d41402abc4b2a76b9719d911017c592"));
        assert!(!query.gremlin.contains("NYC"));
    }

    #[tokio::test]
    async fn test_mirror_create_writes_graph() {
        let graph = Arc::new(InMemoryGraph::new());
        let mirror = RelationshipMirror::new(graph.clone(), Duration::from_secs(1));
        mirror.mirror_create(&record()).await.unwrap();

        assert_eq!(graph.vertex_count(labels::CONTRACT).await, 1);
        assert_eq!(graph.edge_count().await, 3);
        assert_eq!(mirror.stats().successful_writes, 1);
        assert_eq!(mirror.stats().failed_writes, 0);
    }
}
