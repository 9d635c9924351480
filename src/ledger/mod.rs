//! Ledger client for the contract chaincode
//!
//! The ledger is the system of record. The gateway reaches it through the
//! [`LedgerClient`] trait: `invoke` submits a transaction, `query` reads
//! chaincode state, `chain_stats` reports chain height and hashes.
//!
//! - [`HttpLedgerClient`]: JSON-RPC over the peer REST API
//! - [`InMemoryLedger`]: chaincode semantics in memory (dev mode, tests)

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Result;

pub use http::HttpLedgerClient;
pub use memory::InMemoryLedger;

/// State key holding the JSON list of all contract names
pub const INDEX_KEY: &str = "_contractindex";

/// Chaincode functions used by the gateway
pub mod ops {
    pub const INIT_CONTRACT: &str = "init_contract";
    pub const DELETE: &str = "delete";
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
}

/// Acknowledgement of a submitted (not necessarily committed) transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeReceipt {
    /// Transaction id, when the peer reports one
    pub tx_id: Option<String>,
}

/// Trait for ledger access (allows mocking in tests)
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a chaincode invocation
    async fn invoke(&self, function: &str, args: &[String]) -> Result<InvokeReceipt>;

    /// Run a chaincode query and return its raw payload
    async fn query(&self, function: &str, args: &[String]) -> Result<String>;

    /// Chain statistics, passed through untouched
    async fn chain_stats(&self) -> Result<Value>;
}
