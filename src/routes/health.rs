//! Health check endpoints
//!
//! Kubernetes-style health checks:
//! - /health, /healthz - liveness (is the process serving?)
//! - /ready, /readyz - readiness (has the preflight gate opened?)
//!
//! Both report the gate phase and the relationship mirror counters, so a
//! lagging graph shows up without failing either check.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::mirror::MirrorStatsSnapshot;
use crate::readiness::ReadinessPhase;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// True whenever the process is serving
    pub healthy: bool,
    /// "online", "starting" or "degraded"
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server state was built
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub node_id: String,
    pub readiness: ReadinessPhase,
    pub mirror: MirrorStatsSnapshot,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let readiness = state.readiness.phase();
    let status = match readiness {
        ReadinessPhase::Ready { .. } => "online",
        ReadinessPhase::Pending { .. } => "starting",
        ReadinessPhase::Failed { .. } => "degraded",
    };

    HealthResponse {
        healthy: true,
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        readiness,
        mirror: state.records.mirror().stats(),
    }
}

/// Handle liveness check (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// Handle readiness check (/ready, /readyz)
///
/// 503 until the preflight gate opens, and for good if it gave up.
pub fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    let status = if state.readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &build_health_response(state))
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "contract-gateway",
    };
    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::graph::InMemoryGraph;
    use crate::ledger::InMemoryLedger;
    use crate::readiness::ReadinessGate;
    use clap::Parser;
    use std::sync::Arc;

    fn state(gate: ReadinessGate) -> AppState {
        AppState::new(
            Args::parse_from(["contract-gateway", "--dev-mode"]),
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryGraph::new()),
        )
        .with_readiness(Arc::new(gate))
    }

    #[test]
    fn test_liveness_always_ok() {
        assert_eq!(health_check(&state(ReadinessGate::new())).status(), StatusCode::OK);
        assert_eq!(health_check(&state(ReadinessGate::ready())).status(), StatusCode::OK);
    }

    #[test]
    fn test_readiness_follows_gate() {
        assert_eq!(
            readiness_check(&state(ReadinessGate::new())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            readiness_check(&state(ReadinessGate::ready())).status(),
            StatusCode::OK
        );
    }

    #[test]
    fn test_health_body_reports_phase() {
        let response = build_health_response(&state(ReadinessGate::new()));
        assert_eq!(response.status, "starting");
        assert_eq!(response.mode, "development");
        assert_eq!(response.mirror.failed_writes, 0);
    }

    #[test]
    fn test_version_info() {
        assert_eq!(version_info().status(), StatusCode::OK);
    }
}
