//! HTTP server for the contract gateway

pub mod http;

pub use http::{dispatch, run, serve, AppState};
