//! Status synchronization on the observing side
//!
//! Polls the shared store at a fixed cadence and republishes the latest
//! record locally. Last write wins: every successful poll replaces the
//! cache, with no ordering or version check. Failed polls leave the cache
//! untouched and the loop keeps going; the next tick is the retry.

use super::{PollError, StatusStore, StoreError};
use crate::health::{components, HealthRegistry, Outcome};
use crate::models::PatientStatus;
use crate::observability::MonitorMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default polling cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default bound on one poll
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the status synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between two polls
    pub poll_interval: Duration,
    /// Upper bound on one pull before giving up until the next tick
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Polls the shared store and caches the latest record
pub struct StatusSynchronizer {
    store: Arc<dyn StatusStore>,
    config: SyncConfig,
    latest_tx: watch::Sender<Option<PatientStatus>>,
    metrics: MonitorMetrics,
    health: Option<HealthRegistry>,
}

impl StatusSynchronizer {
    /// Create a synchronizer and a receiver observing its cache
    pub fn new(
        store: Arc<dyn StatusStore>,
        config: SyncConfig,
    ) -> (Self, watch::Receiver<Option<PatientStatus>>) {
        let (latest_tx, latest_rx) = watch::channel(None);
        let synchronizer = Self {
            store,
            config,
            latest_tx,
            metrics: MonitorMetrics::new(),
            health: None,
        };
        (synchronizer, latest_rx)
    }

    /// Report poll outcomes to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Another receiver of the cached record
    pub fn subscribe(&self) -> watch::Receiver<Option<PatientStatus>> {
        self.latest_tx.subscribe()
    }

    /// Copy of the cached record
    pub fn latest(&self) -> Option<PatientStatus> {
        self.latest_tx.borrow().clone()
    }

    /// Pull once and replace the cache on success
    pub async fn poll(&self) -> Result<PatientStatus, PollError> {
        let record = tokio::time::timeout(self.config.request_timeout, self.store.pull())
            .await
            .map_err(|_| StoreError::Timeout(self.config.request_timeout))??;

        self.latest_tx.send_replace(Some(record.clone()));
        Ok(record)
    }

    /// Poll until shutdown, swallowing failures
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting status synchronizer"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_and_report().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down status synchronizer");
                    break;
                }
            }
        }
    }

    async fn poll_and_report(&self) {
        let failure = match self.poll().await {
            Ok(record) => {
                debug!(
                    patient = %record.patient_name,
                    ecg_label = %record.status.ecg_label,
                    is_danger = record.status.is_danger,
                    "Status synchronized"
                );
                None
            }
            // Nothing published yet is not a failure of the link
            Err(StoreError::Empty) => {
                debug!("Store has no status yet");
                None
            }
            Err(e) => {
                self.metrics.inc_poll_failures();
                warn!(error = %e, "Poll failed, keeping cached status");
                Some(e.to_string())
            }
        };

        if let Some(health) = &self.health {
            health
                .record_outcome(components::SYNCHRONIZER, Outcome::from_failure(failure))
                .await;
        }
    }
}
