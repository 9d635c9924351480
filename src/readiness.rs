//! Preflight readiness gate
//!
//! At startup the chaincode container may still be starting. The gate polls
//! the index record on a fixed interval until it reads back as a valid
//! (possibly empty) list, giving up after a bounded number of attempts.
//! Until the gate reports ready, the record API answers 503.

use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::records::{IndexState, RecordGateway};
use crate::types::{GatewayError, Result};

/// Successful gate outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    /// Check that succeeded (1-based)
    pub attempts: u32,
}

/// Current gate phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ReadinessPhase {
    /// Still polling; `attempt` is the most recent check started (0 before the first)
    Pending {
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_error: Option<String>,
    },
    Ready {
        attempts: u32,
    },
    Failed {
        reason: String,
    },
}

/// Shared readiness state observed by the HTTP layer
#[derive(Debug)]
pub struct ReadinessGate {
    phase: RwLock<ReadinessPhase>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(ReadinessPhase::Pending {
                attempt: 0,
                last_error: None,
            }),
        }
    }

    /// Gate that is open from the start
    pub fn ready() -> Self {
        let gate = Self::new();
        gate.set(ReadinessPhase::Ready { attempts: 0 });
        gate
    }

    pub fn phase(&self) -> ReadinessPhase {
        match self.phase.read() {
            Ok(phase) => phase.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase(), ReadinessPhase::Ready { .. })
    }

    /// `NotReady` describing why traffic is refused, or `Ok` once ready
    pub fn ensure_ready(&self) -> Result<()> {
        match self.phase() {
            ReadinessPhase::Ready { .. } => Ok(()),
            ReadinessPhase::Pending { attempt, .. } => Err(GatewayError::NotReady(format!(
                "waiting for chaincode (preflight attempt {})",
                attempt
            ))),
            ReadinessPhase::Failed { reason } => Err(GatewayError::NotReady(reason)),
        }
    }

    fn set(&self, phase: ReadinessPhase) {
        match self.phase.write() {
            Ok(mut guard) => *guard = phase,
            Err(poisoned) => *poisoned.into_inner() = phase,
        }
    }

    /// Poll `check` until it reports a usable index.
    ///
    /// A failed check and a malformed index both count as "not yet". The
    /// delay between attempts is fixed; there is no delay after the last one.
    pub async fn await_ready<F, Fut, E>(
        &self,
        mut check: F,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Ready>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<IndexState, E>>,
        E: Display,
    {
        for attempt in 1..=max_attempts {
            self.set(ReadinessPhase::Pending {
                attempt,
                last_error: None,
            });
            info!("[preflight check] attempt {}: testing if chaincode is ready", attempt);

            match check().await {
                Ok(state) => {
                    let known = match state {
                        IndexState::Empty => 0,
                        IndexState::Names(ref names) => names.len(),
                    };
                    info!(
                        "[preflight check] attempt {}: success ({} contracts indexed)",
                        attempt, known
                    );
                    self.set(ReadinessPhase::Ready { attempts: attempt });
                    return Ok(Ready { attempts: attempt });
                }
                Err(e) => {
                    warn!("[preflight check] attempt {}: failed, trying again: {}", attempt, e);
                    self.set(ReadinessPhase::Pending {
                        attempt,
                        last_error: Some(e.to_string()),
                    });
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        let reason = format!(
            "chaincode did not become ready after {} attempts; check peer logs",
            max_attempts
        );
        error!("[preflight check] giving up: {}", reason);
        self.set(ReadinessPhase::Failed {
            reason: reason.clone(),
        });
        Err(GatewayError::Timeout(reason))
    }
}

/// Poll `check` until ready or `max_attempts` checks have failed
pub async fn await_ready<F, Fut, E>(check: F, max_attempts: u32, interval: Duration) -> Result<Ready>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<IndexState, E>>,
    E: Display,
{
    ReadinessGate::new()
        .await_ready(check, max_attempts, interval)
        .await
}

/// Run the preflight check against the ledger index as a background task
pub fn spawn_preflight(
    gate: Arc<ReadinessGate>,
    records: Arc<RecordGateway>,
    max_attempts: u32,
    interval: Duration,
) -> tokio::task::JoinHandle<Result<Ready>> {
    tokio::spawn(async move {
        gate.await_ready(|| records.index_state(), max_attempts, interval)
            .await
    })
}
