//! Status publishing from the signal-producing device

use super::{PublishError, StatusStore, StoreError};
use crate::clinical::escalation_hint;
use crate::models::{ClinicalStatus, PatientProfile, PatientStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Advisory shown when the store could not be reached
pub const OFFLINE_ADVISORY: &str = "Offline mode.";

/// Characters of store advice kept for display
pub const ADVISORY_DISPLAY_CHARS: usize = 80;

/// Default bound on a single push
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Caregiver-facing text produced by a publish attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Advisory {
    /// Store advice, truncated for display
    Advice(String),
    /// Immediate escalation hint for a danger reading
    Escalation(String),
    /// The store was unreachable
    Offline,
}

impl Advisory {
    pub fn text(&self) -> &str {
        match self {
            Advisory::Advice(text) | Advisory::Escalation(text) => text,
            Advisory::Offline => OFFLINE_ADVISORY,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Advisory::Offline)
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Configuration for the status publisher
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Upper bound on one push, including connection setup
    pub timeout: Duration,
    /// Characters of advice kept before the ellipsis
    pub advisory_chars: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PUBLISH_TIMEOUT,
            advisory_chars: ADVISORY_DISPLAY_CHARS,
        }
    }
}

/// Pushes clinical statuses to the shared store
pub struct StatusPublisher {
    store: Arc<dyn StatusStore>,
    profile: PatientProfile,
    config: PublisherConfig,
}

impl StatusPublisher {
    pub fn new(store: Arc<dyn StatusStore>, profile: PatientProfile, config: PublisherConfig) -> Self {
        Self {
            store,
            profile,
            config,
        }
    }

    pub fn profile(&self) -> &PatientProfile {
        &self.profile
    }

    /// Push one status and derive the advisory to display
    pub async fn publish(&self, status: &ClinicalStatus) -> Result<Advisory, PublishError> {
        let record = PatientStatus::from_profile(&self.profile, status.clone());

        let reply = tokio::time::timeout(self.config.timeout, self.store.push(&record))
            .await
            .map_err(|_| StoreError::Timeout(self.config.timeout))??;

        debug!(store_status = %reply.status, is_danger = status.is_danger, "Status published");

        if status.is_danger {
            return Ok(Advisory::Escalation(escalation_hint(self.profile.region)));
        }

        Ok(Advisory::Advice(truncate_advice(
            &reply.medical_advice,
            self.config.advisory_chars,
        )))
    }

    /// Like [`publish`](Self::publish) but degrades to [`Advisory::Offline`]
    pub async fn publish_best_effort(&self, status: &ClinicalStatus) -> Advisory {
        match self.publish(status).await {
            Ok(advisory) => advisory,
            Err(e) => {
                warn!(error = %e, "Publish failed, continuing offline");
                Advisory::Offline
            }
        }
    }
}

/// Keep the first `max_chars` characters and mark the cut
pub fn truncate_advice(advice: &str, max_chars: usize) -> String {
    let mut out: String = advice.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
