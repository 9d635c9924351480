//! Record gateway
//!
//! Translates record operations into chaincode calls. Every call runs under
//! the outbound deadline, and every payload coming back from the ledger is
//! decoded against an explicit shape; anything else is reported as
//! [`GatewayError::BackingStoreCorruption`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ledger::{ops, LedgerClient, INDEX_KEY};
use crate::mirror::RelationshipMirror;
use crate::types::{with_deadline, GatewayError, Result};

/// Message returned for accepted writes
pub const TRANSACTION_COMPLETE: &str = "Transaction Complete";

/// A contract record.
///
/// The chaincode stores the parties as `company1`/`company2`; both spellings
/// decode, and the record always encodes as `party1`/`party2`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub name: String,
    #[serde(default)]
    pub startdate: String,
    #[serde(default)]
    pub enddate: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "company1")]
    pub party1: String,
    #[serde(default, alias = "company2")]
    pub party2: String,
    #[serde(default)]
    pub title: String,
}

impl RecordFields {
    /// Positional arguments for `init_contract`
    pub fn to_chaincode_args(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.startdate.clone(),
            self.enddate.clone(),
            self.location.clone(),
            self.text.clone(),
            self.party1.clone(),
            self.party2.clone(),
            self.title.clone(),
        ]
    }
}

/// Body of a create request; every field is required
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    pub name: Option<String>,
    pub startdate: Option<String>,
    pub enddate: Option<String>,
    pub location: Option<String>,
    pub text: Option<String>,
    pub party1: Option<String>,
    pub party2: Option<String>,
    pub title: Option<String>,
}

impl CreateRequest {
    /// Check the required-fields contract and produce a record
    pub fn validate(self) -> Result<RecordFields> {
        let mut missing = Vec::new();
        let mut take = |field: &'static str, value: Option<String>| {
            value.unwrap_or_else(|| {
                missing.push(field);
                String::new()
            })
        };

        let fields = RecordFields {
            name: take("name", self.name),
            startdate: take("startdate", self.startdate),
            enddate: take("enddate", self.enddate),
            location: take("location", self.location),
            text: take("text", self.text),
            party1: take("party1", self.party1),
            party2: take("party2", self.party2),
            title: take("title", self.title),
        };

        if !missing.is_empty() {
            return Err(GatewayError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        validate_name(&fields.name)?;
        Ok(fields)
    }
}

/// Body carrying a record name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NameRequest {
    pub name: Option<String>,
}

impl NameRequest {
    pub fn validate(self) -> Result<String> {
        let name = self
            .name
            .ok_or_else(|| GatewayError::Validation("Missing required fields: name".into()))?;
        validate_name(&name)?;
        Ok(name)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GatewayError::Validation("name must not be blank".into()));
    }
    if name == INDEX_KEY {
        return Err(GatewayError::Validation(format!("{} is a reserved name", INDEX_KEY)));
    }
    Ok(())
}

/// Acknowledgement of a submitted write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

impl Ack {
    fn submitted(tx_id: Option<String>) -> Self {
        Self {
            message: TRANSACTION_COMPLETE.to_string(),
            tx_id,
        }
    }
}

/// Shape of the index record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    /// Fresh chaincode: the `null` sentinel (and, when listing, an empty payload)
    Empty,
    /// Well-formed list of names (possibly empty)
    Names(Vec<String>),
}

impl IndexState {
    /// Validate an index payload written by an initialized chaincode: the
    /// `null` sentinel or a JSON list of names. An empty payload means the
    /// index key was never written, which is not a usable index.
    pub fn classify(payload: &str) -> Result<Self> {
        let trimmed = payload.trim();
        if trimmed == "null" {
            return Ok(IndexState::Empty);
        }
        serde_json::from_str::<Vec<String>>(trimmed)
            .map(IndexState::Names)
            .map_err(|e| GatewayError::BackingStoreCorruption(format!("Index payload: {}", e)))
    }

    /// Like [`IndexState::classify`], but an empty payload also reads as an
    /// empty index
    pub fn classify_lenient(payload: &str) -> Result<Self> {
        if payload.trim().is_empty() {
            return Ok(IndexState::Empty);
        }
        Self::classify(payload)
    }

    pub fn into_names(self) -> Vec<String> {
        match self {
            IndexState::Empty => Vec::new(),
            IndexState::Names(names) => names,
        }
    }
}

/// Mirror unless the invoke outcome proves no record was written. A timeout
/// or backend failure may still have reached the ledger.
fn should_mirror<T>(receipt: &Result<T>) -> bool {
    match receipt {
        Ok(_) => true,
        Err(GatewayError::Timeout(_)) | Err(GatewayError::Backend(_)) => true,
        Err(_) => false,
    }
}

/// Record operations against the ledger
pub struct RecordGateway {
    ledger: Arc<dyn LedgerClient>,
    mirror: Arc<RelationshipMirror>,
    deadline: Duration,
}

impl RecordGateway {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        mirror: Arc<RelationshipMirror>,
        deadline: Duration,
    ) -> Self {
        Self {
            ledger,
            mirror,
            deadline,
        }
    }

    pub fn mirror(&self) -> &Arc<RelationshipMirror> {
        &self.mirror
    }

    /// Submit a new record and mirror its relationships.
    ///
    /// The mirror write follows the ledger invoke and never changes the
    /// result of the create. It is skipped when the ledger deterministically
    /// rejected the record, so a name maps to at most one contract vertex.
    pub async fn create(&self, fields: &RecordFields) -> Result<Ack> {
        let args = fields.to_chaincode_args();
        let receipt = with_deadline(
            self.deadline,
            "ledger invoke init_contract",
            self.ledger.invoke(ops::INIT_CONTRACT, &args),
        )
        .await;

        if should_mirror(&receipt) {
            if let Err(e) = self.mirror.mirror_create(fields).await {
                warn!(name = %fields.name, error = %e, "Relationship mirror lagging behind ledger");
            }
        } else {
            debug!(name = %fields.name, "Ledger rejected record, skipping relationship mirror");
        }

        let receipt = receipt?;
        info!(name = %fields.name, tx_id = ?receipt.tx_id, "Record create submitted");
        Ok(Ack::submitted(receipt.tx_id))
    }

    /// Fetch a record by name
    pub async fn read(&self, name: &str) -> Result<RecordFields> {
        let payload = self.query_key(name).await?;
        let trimmed = payload.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(GatewayError::NotFound(name.to_string()));
        }
        let record: RecordFields = serde_json::from_str(trimmed).map_err(|e| {
            GatewayError::BackingStoreCorruption(format!("Record {}: {}", name, e))
        })?;
        debug!(name, "Record read");
        Ok(record)
    }

    /// Delete a record by name; absent names are reported, not ignored
    pub async fn delete(&self, name: &str) -> Result<Ack> {
        self.read(name).await?;
        let args = vec![name.to_string()];
        let receipt = with_deadline(
            self.deadline,
            "ledger invoke delete",
            self.ledger.invoke(ops::DELETE, &args),
        )
        .await?;
        info!(name, tx_id = ?receipt.tx_id, "Record delete submitted");
        Ok(Ack::submitted(receipt.tx_id))
    }

    /// Strict index state, for readiness checks
    pub async fn index_state(&self) -> Result<IndexState> {
        let payload = self.query_key(INDEX_KEY).await?;
        IndexState::classify(&payload)
    }

    /// All known record names; an empty store yields an empty list
    pub async fn list_index(&self) -> Result<Vec<String>> {
        let payload = self.query_key(INDEX_KEY).await?;
        Ok(IndexState::classify_lenient(&payload)?.into_names())
    }

    /// Chain statistics passthrough
    pub async fn chain_stats(&self) -> Result<serde_json::Value> {
        with_deadline(self.deadline, "ledger chain stats", self.ledger.chain_stats()).await
    }

    async fn query_key(&self, key: &str) -> Result<String> {
        let args = vec![key.to_string()];
        with_deadline(
            self.deadline,
            "ledger query read",
            self.ledger.query(ops::READ, &args),
        )
        .await
    }
}
