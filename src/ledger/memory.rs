//! In-memory ledger with contract chaincode semantics
//!
//! State starts with the index key holding `null` (an empty, freshly
//! initialized chaincode). Reading an unknown key yields an empty payload.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ops, InvokeReceipt, LedgerClient, INDEX_KEY};
use crate::types::{GatewayError, Result};

/// Chaincode state held in memory
pub struct InMemoryLedger {
    state: RwLock<HashMap<String, String>>,
    height: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let mut state = HashMap::new();
        state.insert(INDEX_KEY.to_string(), "null".to_string());
        Self {
            state: RwLock::new(state),
            height: AtomicU64::new(1),
        }
    }

    /// Number of committed blocks (one per successful invoke, plus genesis)
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn expect_args(function: &str, args: &[String], count: usize) -> Result<()> {
        if args.len() != count {
            return Err(GatewayError::Backend(format!(
                "{}: incorrect number of arguments, expecting {}",
                function, count
            )));
        }
        Ok(())
    }

    fn read_index(state: &HashMap<String, String>) -> Vec<String> {
        state
            .get(INDEX_KEY)
            .and_then(|raw| serde_json::from_str::<Option<Vec<String>>>(raw).ok())
            .flatten()
            .unwrap_or_default()
    }

    fn write_index(state: &mut HashMap<String, String>, index: &[String]) -> Result<()> {
        let raw = serde_json::to_string(index)
            .map_err(|e| GatewayError::Internal(format!("Index encoding failed: {}", e)))?;
        state.insert(INDEX_KEY.to_string(), raw);
        Ok(())
    }

    fn init_contract(state: &mut HashMap<String, String>, args: &[String]) -> Result<()> {
        Self::expect_args(ops::INIT_CONTRACT, args, 8)?;
        let name = &args[0];

        let existing = state
            .get(name)
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|v| v.get("name").and_then(Value::as_str).map(str::to_string));
        if existing.as_deref() == Some(name.as_str()) {
            return Err(GatewayError::AlreadyExists(format!(
                "This contract already exists: {}",
                name
            )));
        }

        let contract = json!({
            "name": name,
            "title": args[7],
            "startdate": args[1],
            "enddate": args[2],
            "location": args[3],
            "text": args[4],
            "company1": args[5],
            "company2": args[6],
        });
        state.insert(name.clone(), contract.to_string());

        let mut index = Self::read_index(state);
        index.push(name.clone());
        Self::write_index(state, &index)
    }

    fn delete(state: &mut HashMap<String, String>, args: &[String]) -> Result<()> {
        Self::expect_args(ops::DELETE, args, 1)?;
        let name = &args[0];
        state.remove(name);

        let mut index = Self::read_index(state);
        if let Some(pos) = index.iter().position(|n| n == name) {
            index.remove(pos);
        }
        Self::write_index(state, &index)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn invoke(&self, function: &str, args: &[String]) -> Result<InvokeReceipt> {
        let mut state = self.state.write().await;
        match function {
            ops::INIT_CONTRACT => Self::init_contract(&mut state, args)?,
            ops::DELETE => Self::delete(&mut state, args)?,
            ops::WRITE => {
                Self::expect_args(ops::WRITE, args, 2)?;
                state.insert(args[0].clone(), args[1].clone());
            }
            other => {
                return Err(GatewayError::Backend(format!(
                    "Received unknown function invocation: {}",
                    other
                )))
            }
        }

        self.height.fetch_add(1, Ordering::SeqCst);
        let tx_id = uuid::Uuid::new_v4().to_string();
        debug!(function, %tx_id, "In-memory ledger invoke committed");
        Ok(InvokeReceipt { tx_id: Some(tx_id) })
    }

    async fn query(&self, function: &str, args: &[String]) -> Result<String> {
        if function != ops::READ {
            return Err(GatewayError::Backend(format!(
                "Received unknown function query: {}",
                function
            )));
        }
        Self::expect_args(ops::READ, args, 1)?;
        let state = self.state.read().await;
        Ok(state.get(&args[0]).cloned().unwrap_or_default())
    }

    async fn chain_stats(&self) -> Result<Value> {
        Ok(json!({
            "height": self.height(),
            "currentBlockHash": format!("{:x}", md5::compute(self.height().to_be_bytes())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract_args(name: &str) -> Vec<String> {
        [name, "2016-01-01", "2017-01-01", "NYC", "hello", "A", "B", "T"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn read_args(key: &str) -> Vec<String> {
        vec![key.to_string()]
    }

    #[tokio::test]
    async fn test_fresh_index_is_null() {
        let ledger = InMemoryLedger::new();
        let index = ledger.query(ops::READ, &read_args(INDEX_KEY)).await.unwrap();
        assert_eq!(index, "null");
    }

    #[tokio::test]
    async fn test_init_contract_stores_and_indexes() {
        let ledger = InMemoryLedger::new();
        let receipt = ledger.invoke(ops::INIT_CONTRACT, &contract_args("C1")).await.unwrap();
        assert!(receipt.tx_id.is_some());

        let raw = ledger.query(ops::READ, &read_args("C1")).await.unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["company1"], "A");
        assert_eq!(stored["title"], "T");

        let index = ledger.query(ops::READ, &read_args(INDEX_KEY)).await.unwrap();
        assert_eq!(index, r#"["C1"]"#);
        assert_eq!(ledger.height(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_contract_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.invoke(ops::INIT_CONTRACT, &contract_args("C1")).await.unwrap();
        let err = ledger
            .invoke(ops::INIT_CONTRACT, &contract_args("C1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_from_index() {
        let ledger = InMemoryLedger::new();
        ledger.invoke(ops::INIT_CONTRACT, &contract_args("C1")).await.unwrap();
        ledger.invoke(ops::INIT_CONTRACT, &contract_args("C2")).await.unwrap();
        ledger.invoke(ops::DELETE, &read_args("C1")).await.unwrap();

        assert_eq!(ledger.query(ops::READ, &read_args("C1")).await.unwrap(), "");
        let index = ledger.query(ops::READ, &read_args(INDEX_KEY)).await.unwrap();
        assert_eq!(index, r#"["C2"]"#);
    }

    #[tokio::test]
    async fn test_wrong_arity_and_unknown_function() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.invoke(ops::INIT_CONTRACT, &read_args("C1")).await.is_err());
        assert!(ledger.invoke("set_user", &read_args("C1")).await.is_err());
        assert!(ledger.query("scan", &read_args("C1")).await.is_err());
    }
}
