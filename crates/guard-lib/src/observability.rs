//! Observability infrastructure for the monitor
//!
//! Provides:
//! - Prometheus metrics (classification latency, publish/poll failures, escalations)
//! - Structured JSON logging with tracing

use crate::escalation::{AlertPhase, AlertSession, Transition};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    classification_latency_seconds: Histogram,
    windows_classified: IntCounter,
    danger_windows: IntCounter,
    publish_failures: IntCounter,
    poll_failures: IntCounter,
    countdowns_started: IntCounter,
    auto_escalations: IntCounter,
    alert_phase: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            classification_latency_seconds: register_histogram!(
                "heartguard_classification_latency_seconds",
                "Time spent classifying one signal window",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register classification_latency_seconds"),

            windows_classified: register_int_counter!(
                "heartguard_windows_classified_total",
                "Signal windows classified"
            )
            .expect("Failed to register windows_classified"),

            danger_windows: register_int_counter!(
                "heartguard_danger_windows_total",
                "Signal windows mapped to a danger status"
            )
            .expect("Failed to register danger_windows"),

            publish_failures: register_int_counter!(
                "heartguard_publish_failures_total",
                "Status pushes that fell back to offline mode"
            )
            .expect("Failed to register publish_failures"),

            poll_failures: register_int_counter!(
                "heartguard_poll_failures_total",
                "Status polls that left the cached status unchanged"
            )
            .expect("Failed to register poll_failures"),

            countdowns_started: register_int_counter!(
                "heartguard_countdowns_started_total",
                "Alert countdowns opened"
            )
            .expect("Failed to register countdowns_started"),

            auto_escalations: register_int_counter!(
                "heartguard_auto_escalations_total",
                "Countdowns that expired without caregiver acknowledgement"
            )
            .expect("Failed to register auto_escalations"),

            alert_phase: register_int_gauge!(
                "heartguard_alert_phase",
                "Current alert phase (0 idle, 1 armed, 2 counting down, 3 resolved, 4 auto-escalated)"
            )
            .expect("Failed to register alert_phase"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_classification(&self, duration_secs: f64, is_danger: bool) {
        let inner = self.inner();
        inner.classification_latency_seconds.observe(duration_secs);
        inner.windows_classified.inc();
        if is_danger {
            inner.danger_windows.inc();
        }
    }

    pub fn inc_publish_failures(&self) {
        self.inner().publish_failures.inc();
    }

    pub fn inc_poll_failures(&self) {
        self.inner().poll_failures.inc();
    }

    pub fn inc_countdowns_started(&self) {
        self.inner().countdowns_started.inc();
    }

    pub fn inc_auto_escalations(&self) {
        self.inner().auto_escalations.inc();
    }

    pub fn set_alert_phase(&self, phase: AlertPhase) {
        self.inner().alert_phase.set(phase.as_gauge());
    }
}

/// Structured logger for monitoring events
///
/// Every line carries a fixed `event` field so log pipelines can filter
/// on it.
#[derive(Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn log_startup(&self, version: &str, role: &str) {
        info!(
            event = "monitor_started",
            device = %self.device,
            version = %version,
            role = %role,
            "HeartGuard started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            device = %self.device,
            reason = %reason,
            "HeartGuard shutting down"
        );
    }

    pub fn log_classification(
        &self,
        window_index: usize,
        label: &str,
        argmax_index: usize,
        confidence: f32,
        is_danger: bool,
    ) {
        if is_danger {
            warn!(
                event = "window_classified",
                device = %self.device,
                window_index,
                label = %label,
                argmax_index,
                confidence,
                is_danger,
                "Danger condition classified"
            );
        } else {
            info!(
                event = "window_classified",
                device = %self.device,
                window_index,
                label = %label,
                argmax_index,
                confidence,
                is_danger,
                "Window classified"
            );
        }
    }

    pub fn log_session_failed(&self, message: &str) {
        error!(
            event = "session_failed",
            device = %self.device,
            error = %message,
            "Monitoring session aborted"
        );
    }

    pub fn log_escalation(&self, transition: &Transition, session: &AlertSession) {
        match transition {
            Transition::AutoEscalated => warn!(
                event = "alert_auto_escalated",
                device = %self.device,
                episode = session.episode,
                "Countdown expired, help dispatched automatically"
            ),
            Transition::Unchanged | Transition::Ticked { .. } | Transition::Suppressed => {}
            other => info!(
                event = "alert_transition",
                device = %self.device,
                transition = ?other,
                phase = ?session.phase,
                remaining_seconds = session.remaining_seconds,
                episode = session.episode,
                "Alert state changed"
            ),
        }
    }
}
