//! Shared status store contract
//!
//! The store mediates between the publishing device and the observers.
//! Both operations are fallible; callers bound them with a timeout.

use crate::models::PatientStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Failures talking to the shared store. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode store response: {0}")]
    Decode(String),
    #[error("no status has been published yet")]
    Empty,
}

/// Error returned by a failed push
pub type PublishError = StoreError;

/// Error returned by a failed pull
pub type PollError = StoreError;

/// Store acknowledgement of a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReply {
    pub status: String,
    pub medical_advice: String,
}

/// Trait for shared status store implementations
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Publish the latest status for a patient
    async fn push(&self, record: &PatientStatus) -> Result<StoreReply, StoreError>;

    /// Fetch the most recently published status
    async fn pull(&self) -> Result<PatientStatus, StoreError>;
}

/// Process-local store, used for single-host setups and tests
///
/// Keeps every pushed record, answers pulls with the last one and can be
/// switched offline or slowed down to exercise degraded paths.
pub struct InMemoryStatusStore {
    history: RwLock<Vec<PatientStatus>>,
    advice: Mutex<String>,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(Vec::new()),
            advice: Mutex::new("Keep resting and stay hydrated.".to_string()),
            offline: AtomicBool::new(false),
            latency: Mutex::new(None),
        }
    }

    /// Advice text returned for every accepted push
    pub fn with_advice(self, advice: impl Into<String>) -> Self {
        if let Ok(mut current) = self.advice.lock() {
            *current = advice.into();
        }
        self
    }

    /// Make every request fail with a connection error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every request by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// All records accepted so far, oldest first
    pub async fn history(&self) -> Vec<PatientStatus> {
        self.history.read().await.clone()
    }

    async fn simulate_network(&self) -> Result<(), StoreError> {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store unreachable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn push(&self, record: &PatientStatus) -> Result<StoreReply, StoreError> {
        self.simulate_network().await?;

        let advice = self
            .advice
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default();

        // The store attaches its own analysis, like the remote backend does
        let mut stored = record.clone();
        stored.status = stored.status.with_advisory(advice.clone());
        self.history.write().await.push(stored);

        Ok(StoreReply {
            status: "received".to_string(),
            medical_advice: advice,
        })
    }

    async fn pull(&self) -> Result<PatientStatus, StoreError> {
        self.simulate_network().await?;
        self.history
            .read()
            .await
            .last()
            .cloned()
            .ok_or(StoreError::Empty)
    }
}
