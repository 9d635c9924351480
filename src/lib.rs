//! Contract gateway - REST front door for ledger-backed contract records
//!
//! Records live in a ledger chaincode (the system of record). Each created
//! record is also projected into a graph store so that relationship queries
//! ("every contract at this location") can be answered by traversal, with
//! the records themselves always re-read from the ledger.
//!
//! ## Components
//!
//! - **Readiness gate**: polls the chaincode index at startup; API routes
//!   answer 503 until it opens
//! - **Record gateway**: create, read, delete and index over the ledger
//! - **Relationship mirror**: best-effort graph writes alongside each create
//! - **Query mirror**: location traversal plus bounded parallel ledger reads

pub mod config;
pub mod graph;
pub mod ledger;
pub mod mirror;
pub mod readiness;
pub mod records;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
