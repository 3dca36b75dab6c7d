//! Wearable to companion flow through an in-memory store

use guard_lib::classifier::{ClassificationResult, Classifier, ClassifierError};
use guard_lib::clinical::ClinicalMapper;
use guard_lib::escalation::{AlertPhase, EscalationConfig, EscalationDriver};
use guard_lib::session::{MonitoringSession, SessionConfig, SessionOutcome, SessionUpdate};
use guard_lib::signal::{SignalSource, SignalWindow, WindowDriver, DEFAULT_WINDOW_SIZE};
use guard_lib::sync::{
    Advisory, InMemoryStatusStore, PublisherConfig, StatusPublisher, StatusStore,
    StatusSynchronizer, SyncConfig,
};
use guard_lib::{PatientProfile, Region, StructuredLogger};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Classifies window `i` as `classes[i]`
struct SequenceClassifier {
    classes: Vec<usize>,
    next: AtomicUsize,
}

impl Classifier for SequenceClassifier {
    fn classify(&self, window: &SignalWindow) -> Result<ClassificationResult, ClassifierError> {
        assert_eq!(window.len(), DEFAULT_WINDOW_SIZE);
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        let mut probabilities = vec![0.0; 2];
        probabilities[self.classes[i]] = 1.0;
        ClassificationResult::from_probabilities(probabilities)
    }

    fn num_classes(&self) -> Option<usize> {
        Some(2)
    }
}

fn wearable_session(
    store: Arc<InMemoryStatusStore>,
    samples: usize,
) -> (MonitoringSession, tokio::sync::watch::Receiver<SessionUpdate>) {
    let profile = PatientProfile {
        region: Region::Urban,
        ..PatientProfile::default()
    };
    let source = SignalSource::from_samples((0..samples).map(|i| (i as f32).sin()).collect());

    MonitoringSession::new(
        WindowDriver::new(source, DEFAULT_WINDOW_SIZE),
        ClinicalMapper::new(profile.region),
        StatusPublisher::new(store, profile, PublisherConfig::default()),
        SessionConfig::default(),
        StructuredLogger::new("wearable"),
    )
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_window_opens_caregiver_countdown() {
    let store = Arc::new(InMemoryStatusStore::new().with_advice("Vitals within target."));
    let (session, updates) = wearable_session(store.clone(), 720);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let classifier = SequenceClassifier {
        classes: vec![0, 1],
        next: AtomicUsize::new(0),
    };
    let summary = session
        .run(move || Ok(classifier), shutdown_tx.subscribe())
        .await
        .unwrap();

    assert_eq!(summary.windows, 2);
    assert_eq!(summary.outcome, SessionOutcome::Exhausted);
    assert_eq!(*updates.borrow(), SessionUpdate::Finished { windows: 2 });

    let published = store.history().await;
    assert_eq!(published.len(), 2);
    assert!(!published[0].status.is_danger);
    assert_eq!(published[0].status.ecg_label, "Normal");
    assert!(published[1].status.is_danger);

    // Companion side
    let config = SyncConfig::default();
    let poll_interval = config.poll_interval;
    let (synchronizer, status_rx) = StatusSynchronizer::new(store.clone(), config);
    let driver = EscalationDriver::new(
        EscalationConfig::default(),
        StructuredLogger::new("companion"),
    );
    let mut alerts = driver.subscribe();
    assert_eq!(alerts.borrow().phase, AlertPhase::Idle);

    let started = tokio::time::Instant::now();
    let sync_task = tokio::spawn(synchronizer.run(shutdown_tx.subscribe()));
    let escalation_task = tokio::spawn(driver.clone().run(status_rx, shutdown_tx.subscribe()));

    alerts.changed().await.unwrap();
    let session = alerts.borrow_and_update().clone();
    assert_eq!(session.phase, AlertPhase::CountingDown);
    assert_eq!(session.remaining_seconds, 60);
    assert_eq!(session.episode, 1);
    assert!(started.elapsed() <= poll_interval);

    shutdown_tx.send(()).unwrap();
    sync_task.await.unwrap();
    escalation_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_offline_store_still_classifies_every_window() {
    let store = Arc::new(InMemoryStatusStore::new());
    store.set_offline(true);
    let (session, mut updates) = wearable_session(store.clone(), 720 + 100);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let classifier = SequenceClassifier {
        classes: vec![1, 1],
        next: AtomicUsize::new(0),
    };
    let handle = tokio::spawn(session.run(move || Ok(classifier), shutdown_rx));

    updates.changed().await.unwrap();
    if let SessionUpdate::Reading { advisory, .. } = &*updates.borrow_and_update() {
        assert_eq!(*advisory, Advisory::Offline);
    } else {
        panic!("expected a reading");
    }

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.windows, 2);
    assert_eq!(summary.publish_failures, 2);
    assert!(store.pull().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cleared_danger_rearms_next_episode() {
    let store = Arc::new(InMemoryStatusStore::new());
    let (synchronizer, status_rx) = StatusSynchronizer::new(store.clone(), SyncConfig::default());
    let driver = EscalationDriver::new(
        EscalationConfig::default(),
        StructuredLogger::new("companion"),
    );
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let sync_task = tokio::spawn(synchronizer.run(shutdown_tx.subscribe()));
    let escalation_task = tokio::spawn(driver.clone().run(status_rx, shutdown_tx.subscribe()));

    let (session, _) = wearable_session(store.clone(), 360);
    let classifier = SequenceClassifier {
        classes: vec![1],
        next: AtomicUsize::new(0),
    };
    let (_tx, rx) = broadcast::channel::<()>(1);
    session.run(move || Ok(classifier), rx).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(driver.snapshot().phase, AlertPhase::CountingDown);
    driver.confirm_medication_taken().unwrap();

    // Danger persists across polls: no second prompt
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(driver.snapshot().phase, AlertPhase::Resolved);
    assert_eq!(driver.snapshot().episode, 1);

    let (session, _) = wearable_session(store.clone(), 360);
    let classifier = SequenceClassifier {
        classes: vec![0],
        next: AtomicUsize::new(0),
    };
    let (_tx, rx) = broadcast::channel::<()>(1);
    session.run(move || Ok(classifier), rx).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(driver.snapshot().phase, AlertPhase::Idle);
    assert!(!driver.snapshot().dismissed_for_episode);

    let (session, _) = wearable_session(store.clone(), 360);
    let classifier = SequenceClassifier {
        classes: vec![1],
        next: AtomicUsize::new(0),
    };
    let (_tx, rx) = broadcast::channel::<()>(1);
    session.run(move || Ok(classifier), rx).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let alert = driver.snapshot();
    assert_eq!(alert.phase, AlertPhase::CountingDown);
    assert_eq!(alert.episode, 2);

    shutdown_tx.send(()).unwrap();
    sync_task.await.unwrap();
    escalation_task.await.unwrap();
}
