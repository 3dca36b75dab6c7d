//! Window/publish loop of the signal-producing device
//!
//! One cycle: next window, classify, map, publish (best-effort), emit the
//! update, wait for the next beat. The loop can be stopped between any two
//! steps and owns its classifier, which is dropped exactly once on every
//! exit path.

use crate::classifier::{check_width, Classifier, ClassifierError};
use crate::clinical::ClinicalMapper;
use crate::health::{components, HealthRegistry, Outcome};
use crate::models::ClinicalStatus;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::signal::WindowDriver;
use crate::sync::{Advisory, StatusPublisher};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Default pause between two cycles
pub const DEFAULT_BEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Text shown once the signal source is exhausted
pub const FINISHED_TEXT: &str = "Monitoring ended.";

/// Headline shown when the session aborts
pub const FAILED_TEXT: &str = "FATAL ERROR";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Configuration for a monitoring session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inter-beat interval; a slow publish eats into it
    pub beat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            beat_interval: DEFAULT_BEAT_INTERVAL,
        }
    }
}

/// Snapshot emitted to local observers after every step that matters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionUpdate {
    Starting,
    Reading {
        window_index: usize,
        status: ClinicalStatus,
        advisory: Advisory,
        probabilities: Vec<f32>,
    },
    /// Source exhausted
    Finished { windows: usize },
    /// Stopped by the user
    Stopped { windows: usize },
    Failed { message: String },
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionUpdate::Finished { .. }
                | SessionUpdate::Stopped { .. }
                | SessionUpdate::Failed { .. }
        )
    }

    /// One-line text for a display
    pub fn headline(&self) -> String {
        match self {
            SessionUpdate::Starting => "Starting monitoring...".to_string(),
            SessionUpdate::Reading { status, .. } => status.ecg_label.clone(),
            SessionUpdate::Finished { .. } => FINISHED_TEXT.to_string(),
            SessionUpdate::Stopped { .. } => "Monitoring stopped.".to_string(),
            SessionUpdate::Failed { .. } => FAILED_TEXT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every window was classified
    Exhausted,
    Cancelled,
}

/// Totals of a session that ended without a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub windows: usize,
    pub publish_failures: usize,
    pub outcome: SessionOutcome,
}

/// The window/publish loop
pub struct MonitoringSession {
    windows: WindowDriver,
    mapper: ClinicalMapper,
    publisher: StatusPublisher,
    config: SessionConfig,
    updates: watch::Sender<SessionUpdate>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl MonitoringSession {
    pub fn new(
        windows: WindowDriver,
        mapper: ClinicalMapper,
        publisher: StatusPublisher,
        config: SessionConfig,
        logger: StructuredLogger,
    ) -> (Self, watch::Receiver<SessionUpdate>) {
        let (updates, updates_rx) = watch::channel(SessionUpdate::Starting);
        let session = Self {
            windows,
            mapper,
            publisher,
            config,
            updates,
            metrics: MonitorMetrics::new(),
            logger,
            health: None,
        };
        (session, updates_rx)
    }

    /// Report classifier and publisher state to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Another receiver of session updates
    pub fn subscribe(&self) -> watch::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Run until the source is exhausted, shutdown fires or the classifier fails
    ///
    /// `open_classifier` runs once, inside the session, so a model that
    /// fails to load is reported like any other fatal error.
    pub async fn run<C, F>(
        mut self,
        open_classifier: F,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<SessionSummary, SessionError>
    where
        C: Classifier,
        F: FnOnce() -> Result<C, ClassifierError>,
    {
        info!(
            window_size = self.windows.window_size(),
            beat_ms = self.config.beat_interval.as_millis() as u64,
            "Starting monitoring session"
        );

        let classifier = match open_classifier() {
            Ok(classifier) => classifier,
            Err(e) => return Err(self.fail(e).await),
        };
        self.set_health(components::CLASSIFIER, Outcome::Ok).await;

        let outcome = self.drive(&classifier, &mut shutdown).await;
        drop(classifier);

        match outcome {
            Ok(summary) => {
                let update = match summary.outcome {
                    SessionOutcome::Exhausted => SessionUpdate::Finished {
                        windows: summary.windows,
                    },
                    SessionOutcome::Cancelled => SessionUpdate::Stopped {
                        windows: summary.windows,
                    },
                };
                info!(
                    windows = summary.windows,
                    publish_failures = summary.publish_failures,
                    outcome = ?summary.outcome,
                    "Monitoring session ended"
                );
                self.updates.send_replace(update);
                Ok(summary)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn drive<C: Classifier>(
        &mut self,
        classifier: &C,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<SessionSummary, ClassifierError> {
        let mut ticker = interval(self.config.beat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut windows = 0usize;
        let mut publish_failures = 0usize;
        let summary = |outcome, windows, publish_failures| SessionSummary {
            windows,
            publish_failures,
            outcome,
        };

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    return Ok(summary(SessionOutcome::Cancelled, windows, publish_failures));
                }
            }

            let Ok(window) = self.windows.next_window() else {
                return Ok(summary(SessionOutcome::Exhausted, windows, publish_failures));
            };

            if stop_requested(shutdown) {
                return Ok(summary(SessionOutcome::Cancelled, windows, publish_failures));
            }

            let started = Instant::now();
            let result = classifier.classify(&window)?;
            check_width(&result.probabilities, classifier.num_classes())?;
            let status = self.mapper.map(&result);
            self.metrics
                .observe_classification(started.elapsed().as_secs_f64(), status.is_danger);
            self.logger.log_classification(
                windows,
                &status.ecg_label,
                result.argmax_index,
                result.confidence(),
                status.is_danger,
            );

            let advisory = tokio::select! {
                advisory = self.publisher.publish_best_effort(&status) => advisory,
                _ = shutdown.recv() => {
                    return Ok(summary(SessionOutcome::Cancelled, windows + 1, publish_failures));
                }
            };

            if advisory.is_offline() {
                publish_failures += 1;
                self.metrics.inc_publish_failures();
                self.set_health(
                    components::PUBLISHER,
                    Outcome::Degraded("Store unreachable, offline mode".to_string()),
                )
                .await;
            } else {
                self.set_health(components::PUBLISHER, Outcome::Ok).await;
            }

            debug!(window_index = windows, advisory = %advisory, "Cycle complete");
            self.updates.send_replace(SessionUpdate::Reading {
                window_index: windows,
                status: status.with_advisory(advisory.text()),
                advisory,
                probabilities: result.probabilities,
            });
            windows += 1;
        }
    }

    async fn fail(&self, error: ClassifierError) -> SessionError {
        let message = error.to_string();
        self.logger.log_session_failed(&message);
        self.set_health(components::CLASSIFIER, Outcome::Failed(message.clone()))
            .await;
        self.updates.send_replace(SessionUpdate::Failed { message });
        SessionError::Classifier(error)
    }

    async fn set_health(&self, component: &str, outcome: Outcome) {
        if let Some(health) = &self.health {
            health.record_outcome(component, outcome).await;
        }
    }
}

/// Non-blocking check for a pending stop request
fn stop_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    use broadcast::error::TryRecvError;
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationResult;
    use crate::models::{PatientProfile, Region};
    use crate::signal::{SignalSource, SignalWindow, DEFAULT_WINDOW_SIZE};
    use crate::sync::{InMemoryStatusStore, PublisherConfig, OFFLINE_ADVISORY};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a fixed class per call and counts its own drops
    struct ScriptedClassifier {
        classes: Vec<usize>,
        calls: AtomicUsize,
        fail_at: Option<usize>,
        declared_classes: Option<usize>,
        drops: Arc<AtomicUsize>,
    }

    impl ScriptedClassifier {
        fn new(classes: Vec<usize>, drops: Arc<AtomicUsize>) -> Self {
            Self {
                classes,
                calls: AtomicUsize::new(0),
                fail_at: None,
                declared_classes: None,
                drops,
            }
        }
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&self, _window: &SignalWindow) -> Result<ClassificationResult, ClassifierError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(call) {
                return Err(ClassifierError::Classification("tensor shape mismatch".into()));
            }
            let class = self.classes[call % self.classes.len()];
            let mut probabilities = vec![0.1; 2];
            probabilities[class] = 0.9;
            ClassificationResult::from_probabilities(probabilities)
        }

        fn num_classes(&self) -> Option<usize> {
            self.declared_classes
        }
    }

    impl Drop for ScriptedClassifier {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(
        windows: usize,
        store: Arc<InMemoryStatusStore>,
    ) -> (MonitoringSession, watch::Receiver<SessionUpdate>) {
        let source = SignalSource::from_samples(vec![0.0; windows * DEFAULT_WINDOW_SIZE]);
        let publisher = StatusPublisher::new(
            store,
            PatientProfile::default(),
            PublisherConfig::default(),
        );
        MonitoringSession::new(
            WindowDriver::new(source, DEFAULT_WINDOW_SIZE),
            ClinicalMapper::new(Region::Urban),
            publisher,
            SessionConfig::default(),
            StructuredLogger::new("test"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_releases_classifier_once() {
        let store = Arc::new(InMemoryStatusStore::new().with_advice("Rest."));
        let (session, updates) = session(3, store.clone());
        let (_tx, shutdown_rx) = broadcast::channel(1);
        let drops = Arc::new(AtomicUsize::new(0));

        let classifier = ScriptedClassifier::new(vec![0], drops.clone());
        let summary = session.run(move || Ok(classifier), shutdown_rx).await.unwrap();

        assert_eq!(summary.windows, 3);
        assert_eq!(summary.outcome, SessionOutcome::Exhausted);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(store.history().await.len(), 3);
        assert_eq!(*updates.borrow(), SessionUpdate::Finished { windows: 3 });
        assert_eq!(updates.borrow().headline(), FINISHED_TEXT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_store_keeps_loop_running() {
        let store = Arc::new(InMemoryStatusStore::new());
        store.set_offline(true);
        let (session, mut updates) = session(2, store);
        let (_tx, shutdown_rx) = broadcast::channel(1);
        let drops = Arc::new(AtomicUsize::new(0));

        let classifier = ScriptedClassifier::new(vec![0], drops);
        let handle = tokio::spawn(session.run(move || Ok(classifier), shutdown_rx));

        updates.changed().await.unwrap();
        let first_at = tokio::time::Instant::now();
        match &*updates.borrow_and_update() {
            SessionUpdate::Reading {
                advisory, status, ..
            } => {
                assert_eq!(*advisory, Advisory::Offline);
                assert_eq!(status.advisory_text, OFFLINE_ADVISORY);
            }
            other => panic!("unexpected update {:?}", other),
        }

        updates.changed().await.unwrap();
        // Next window follows after one beat, no extra delay
        let gap = first_at.elapsed();
        assert!(gap >= DEFAULT_BEAT_INTERVAL);
        assert!(gap < DEFAULT_BEAT_INTERVAL * 2);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.publish_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_between_cycles() {
        let store = Arc::new(InMemoryStatusStore::new());
        let (session, mut updates) = session(10, store.clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let drops = Arc::new(AtomicUsize::new(0));

        let classifier = ScriptedClassifier::new(vec![0], drops.clone());
        let handle = tokio::spawn(session.run(move || Ok(classifier), shutdown_rx));

        updates.changed().await.unwrap();
        shutdown_tx.send(()).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.outcome, SessionOutcome::Cancelled);
        assert!(summary.windows < 10);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(matches!(*updates.borrow(), SessionUpdate::Stopped { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_classification_error_is_fatal() {
        let store = Arc::new(InMemoryStatusStore::new());
        let (session, updates) = session(5, store.clone());
        let (_tx, shutdown_rx) = broadcast::channel(1);
        let drops = Arc::new(AtomicUsize::new(0));
        let health = HealthRegistry::new();

        let mut classifier = ScriptedClassifier::new(vec![0], drops.clone());
        classifier.fail_at = Some(1);
        let err = session
            .with_health(health.clone())
            .run(move || Ok(classifier), shutdown_rx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Classifier(ClassifierError::Classification(_))
        ));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(store.history().await.len(), 1);
        assert_eq!(updates.borrow().headline(), FAILED_TEXT);
        assert!(!health.health().await.status.is_operational());
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_narrower_than_label_set_is_fatal() {
        let store = Arc::new(InMemoryStatusStore::new());
        let (session, updates) = session(3, store.clone());
        let (_tx, shutdown_rx) = broadcast::channel(1);
        let drops = Arc::new(AtomicUsize::new(0));
        let health = HealthRegistry::new();

        let mut classifier = ScriptedClassifier::new(vec![1], drops.clone());
        classifier.declared_classes = Some(3);
        let err = session
            .with_health(health.clone())
            .run(move || Ok(classifier), shutdown_rx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Classifier(ClassifierError::Classification(ref m)) if m.contains("expected 3")
        ));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(store.history().await.is_empty());
        assert!(matches!(*updates.borrow(), SessionUpdate::Failed { .. }));
        health.set_ready(true).await;
        let readiness = health.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().starts_with("classifier failed:"));
    }

    #[tokio::test]
    async fn test_model_load_error_reports_failure() {
        let store = Arc::new(InMemoryStatusStore::new());
        let (session, updates) = session(1, store.clone());
        let (_tx, shutdown_rx) = broadcast::channel(1);

        let err = session
            .run(
                || -> Result<ScriptedClassifier, ClassifierError> {
                    Err(ClassifierError::ModelLoad("missing model.onnx".into()))
                },
                shutdown_rx,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Classifier(ClassifierError::ModelLoad(_))
        ));
        assert!(store.history().await.is_empty());
        match &*updates.borrow() {
            SessionUpdate::Failed { message } => assert!(message.contains("missing model.onnx")),
            other => panic!("unexpected update {:?}", other),
        };
    }
}
