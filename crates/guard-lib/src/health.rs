//! Pipeline health for the monitor
//!
//! Every stage (classifier, publisher, synchronizer, escalation) reports
//! an [`Outcome`] after each cycle through [`HealthRegistry::record_outcome`].
//! A store outage or an unacknowledged escalation degrades its stage; a
//! classifier that cannot run fails it and takes the monitor out of
//! readiness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pipeline stage names
pub mod components {
    pub const CLASSIFIER: &str = "classifier";
    pub const PUBLISHER: &str = "publisher";
    pub const SYNCHRONIZER: &str = "synchronizer";
    pub const ESCALATION: &str = "escalation";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still classifying, but a side channel is impaired
    Degraded,
    /// The stage stopped; no further readings will be produced
    Unhealthy,
}

impl ComponentStatus {
    /// Whether the monitor keeps producing readings in this state
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

/// Result of one cycle of a pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Degraded(String),
    Failed(String),
}

impl Outcome {
    /// Non-fatal outcome from an optional failure message
    pub fn from_failure(failure: Option<impl Into<String>>) -> Self {
        match failure {
            Some(message) => Outcome::Degraded(message.into()),
            None => Outcome::Ok,
        }
    }

    fn into_parts(self) -> (ComponentStatus, Option<String>) {
        match self {
            Outcome::Ok => (ComponentStatus::Healthy, None),
            Outcome::Degraded(message) => (ComponentStatus::Degraded, Some(message)),
            Outcome::Failed(message) => (ComponentStatus::Unhealthy, Some(message)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the stage entered its current state
    pub since: DateTime<Utc>,
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared view of every stage's last outcome
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a stage, starting healthy
    pub async fn register(&self, name: &str) {
        self.components.write().await.insert(
            name.to_string(),
            ComponentHealth {
                status: ComponentStatus::Healthy,
                message: None,
                since: Utc::now(),
            },
        );
    }

    /// Record the outcome of one cycle of `name`
    ///
    /// Repeating the current state keeps its `since` timestamp.
    pub async fn record_outcome(&self, name: &str, outcome: Outcome) {
        let (status, message) = outcome.into_parts();
        let mut components = self.components.write().await;

        if let Some(current) = components.get(name) {
            if current.status == status && current.message == message {
                return;
            }
        }
        components.insert(
            name.to_string(),
            ComponentHealth {
                status,
                message,
                since: Utc::now(),
            },
        );
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().await.get(name).cloned()
    }

    /// Mark the monitor as started
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Worst stage status wins
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .map(|c| c.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("monitor starting".to_string()),
            };
        }

        let components = self.components.read().await;
        let failed = components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy);

        match failed {
            Some((name, c)) => ReadinessResponse {
                ready: false,
                reason: Some(match &c.message {
                    Some(message) => format!("{} failed: {}", name, message),
                    None => format!("{} failed", name),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wearable_registry() -> HealthRegistry {
        let registry = HealthRegistry::new();
        registry.register(components::CLASSIFIER).await;
        registry.register(components::PUBLISHER).await;
        registry
    }

    #[tokio::test]
    async fn test_no_stages_is_healthy() {
        let health = HealthRegistry::new().health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_offline_store_degrades_then_recovers() {
        let registry = wearable_registry().await;

        registry
            .record_outcome(
                components::PUBLISHER,
                Outcome::Degraded("store unreachable".to_string()),
            )
            .await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.status.is_operational());
        assert_eq!(
            health.components[components::PUBLISHER].message.as_deref(),
            Some("store unreachable")
        );

        registry
            .record_outcome(components::PUBLISHER, Outcome::Ok)
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_repeated_outcome_keeps_since() {
        let registry = wearable_registry().await;
        let offline = || Outcome::from_failure(Some("store unreachable"));

        registry.record_outcome(components::PUBLISHER, offline()).await;
        let first = registry.component(components::PUBLISHER).await.unwrap();
        registry.record_outcome(components::PUBLISHER, offline()).await;
        let second = registry.component(components::PUBLISHER).await.unwrap();

        assert_eq!(first.since, second.since);
    }

    #[tokio::test]
    async fn test_failed_classifier_blocks_readiness() {
        let registry = wearable_registry().await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .record_outcome(
                components::CLASSIFIER,
                Outcome::Failed("model load failed".to_string()),
            )
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("classifier failed: model load failed")
        );
        assert!(!registry.health().await.status.is_operational());
    }

    #[tokio::test]
    async fn test_failure_outranks_degradation() {
        let registry = wearable_registry().await;
        registry
            .record_outcome(components::PUBLISHER, Outcome::from_failure(Some("offline")))
            .await;
        registry
            .record_outcome(components::CLASSIFIER, Outcome::Failed("bad tensor".into()))
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_not_ready_while_starting() {
        let registry = wearable_registry().await;
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("monitor starting"));
    }

    #[tokio::test]
    async fn test_outcome_from_failure() {
        assert_eq!(Outcome::from_failure(None::<String>), Outcome::Ok);
        assert_eq!(
            Outcome::from_failure(Some("timeout")),
            Outcome::Degraded("timeout".to_string())
        );
    }
}
