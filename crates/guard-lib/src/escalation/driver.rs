//! Async driver around [`EscalationMachine`]
//!
//! Owns the countdown task and the snapshot channel. Every input goes
//! through one mutex-guarded check-and-set on the machine, so a caregiver
//! action racing a danger-cleared poll or the final tick yields exactly one
//! terminal transition.

use super::machine::{AlertPhase, AlertSession, EscalationError, EscalationMachine, Transition};
use super::DEFAULT_COUNTDOWN_SECS;
use crate::health::{components, HealthRegistry, Outcome};
use crate::models::PatientStatus;
use crate::observability::{MonitorMetrics, StructuredLogger};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the escalation driver
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Seconds before an unacknowledged alert escalates on its own
    pub countdown_secs: u32,
    /// Countdown tick period
    pub tick_interval: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            tick_interval: Duration::from_secs(1),
        }
    }
}

struct Countdown {
    episode: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    machine: Mutex<EscalationMachine>,
    countdown: Mutex<Option<Countdown>>,
    snapshots: watch::Sender<AlertSession>,
    tick_interval: Duration,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    health_report: AsyncMutex<()>,
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, EscalationMachine> {
        // The machine holds no invariant a panicking reader could break
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn countdown(&self) -> MutexGuard<'_, Option<Countdown>> {
        self.countdown.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply one input and publish its effects
    ///
    /// The countdown task is started or stopped before the machine lock is
    /// released, so the stored ticker always belongs to the latest episode.
    fn apply<F>(self: &Arc<Self>, input: F) -> (Transition, AlertSession)
    where
        F: FnOnce(&mut EscalationMachine) -> Transition,
    {
        let (transition, session) = {
            let mut machine = self.machine();
            let transition = input(&mut machine);
            match transition {
                Transition::CountdownStarted { episode } => self.start_countdown(episode),
                // The ticker returns on its own after the final tick
                Transition::AutoEscalated => drop(self.countdown().take()),
                t if t.stops_countdown() => self.stop_countdown(),
                _ => {}
            }
            (transition, machine.session().clone())
        };

        if !matches!(transition, Transition::Unchanged | Transition::Suppressed) {
            self.snapshots.send_replace(session.clone());
            self.metrics.set_alert_phase(session.phase);
        }

        match transition {
            Transition::CountdownStarted { .. } => self.metrics.inc_countdowns_started(),
            Transition::AutoEscalated => self.metrics.inc_auto_escalations(),
            _ => {}
        }
        self.logger.log_escalation(&transition, &session);

        (transition, session)
    }

    fn start_countdown(self: &Arc<Self>, episode: u64) {
        // Weak so an abandoned driver is not kept alive by its own ticker
        let weak: Weak<Inner> = Arc::downgrade(self);
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };

                let (transition, _) = inner.apply(|m| m.tick_episode(episode));
                match transition {
                    Transition::Ticked { .. } => {}
                    Transition::AutoEscalated => {
                        inner.report_health().await;
                        break;
                    }
                    _ => break,
                }
            }
            debug!(episode, "Countdown task finished");
        });

        let previous = self.countdown().replace(Countdown { episode, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    fn stop_countdown(&self) {
        if let Some(countdown) = self.countdown().take() {
            countdown.handle.abort();
        }
    }

    /// Escalation is degraded from auto-escalation until the danger clears
    async fn report_health(&self) {
        let Some(health) = &self.health else { return };

        // Serialized so the last report reflects the latest phase
        let _report = self.health_report.lock().await;
        let phase = self.machine().phase();
        let outcome = match phase {
            AlertPhase::AutoEscalated => {
                Outcome::Degraded("Alert escalated without acknowledgement".to_string())
            }
            _ => Outcome::Ok,
        };
        health.record_outcome(components::ESCALATION, outcome).await;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(countdown) = self.countdown.get_mut().ok().and_then(|c| c.take()) {
            countdown.handle.abort();
        }
    }
}

/// Cloneable handle to the escalation state machine
///
/// Must be used from within a tokio runtime: opening a countdown spawns
/// the ticking task.
#[derive(Clone)]
pub struct EscalationDriver {
    inner: Arc<Inner>,
}

impl EscalationDriver {
    pub fn new(config: EscalationConfig, logger: StructuredLogger) -> Self {
        Self::build(config, logger, None)
    }

    /// Driver that reports auto-escalations to `health`
    pub fn with_health(
        config: EscalationConfig,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        Self::build(config, logger, Some(health))
    }

    fn build(
        config: EscalationConfig,
        logger: StructuredLogger,
        health: Option<HealthRegistry>,
    ) -> Self {
        let machine = EscalationMachine::new(config.countdown_secs);
        let (snapshots, _) = watch::channel(machine.session().clone());

        Self {
            inner: Arc::new(Inner {
                machine: Mutex::new(machine),
                countdown: Mutex::new(None),
                snapshots,
                tick_interval: config.tick_interval,
                metrics: MonitorMetrics::new(),
                logger,
                health,
                health_report: AsyncMutex::new(()),
            }),
        }
    }

    /// Observe snapshots after every state change
    pub fn subscribe(&self) -> watch::Receiver<AlertSession> {
        self.inner.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> AlertSession {
        self.inner.machine().session().clone()
    }

    /// Feed the danger flag of the latest synchronized status
    pub fn observe(&self, danger: bool) -> Transition {
        self.inner.apply(|m| m.observe(danger)).0
    }

    pub fn confirm_medication_taken(&self) -> Result<Transition, EscalationError> {
        self.caregiver_action(EscalationMachine::confirm_medication_taken)
    }

    pub fn decline_medication(&self) -> Result<Transition, EscalationError> {
        self.caregiver_action(EscalationMachine::decline_medication)
    }

    pub fn request_help(&self) -> Result<Transition, EscalationError> {
        self.caregiver_action(EscalationMachine::request_help)
    }

    fn caregiver_action(
        &self,
        action: fn(&mut EscalationMachine) -> Result<Transition, EscalationError>,
    ) -> Result<Transition, EscalationError> {
        let mut outcome = Ok(Transition::Unchanged);
        self.inner.apply(|m| match action(m) {
            Ok(t) => {
                outcome = Ok(t);
                t
            }
            Err(e) => {
                outcome = Err(e);
                Transition::Unchanged
            }
        });
        outcome
    }

    /// Follow a synchronized status stream until shutdown
    pub async fn run(
        self,
        mut status_rx: watch::Receiver<Option<PatientStatus>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Starting escalation driver");

        loop {
            tokio::select! {
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        info!("Status source closed, stopping escalation driver");
                        break;
                    }
                    let danger = status_rx
                        .borrow_and_update()
                        .as_ref()
                        .map(|record| record.status.is_danger);
                    if let Some(danger) = danger {
                        if self.observe(danger) == Transition::Cleared {
                            self.inner.report_health().await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down escalation driver");
                    break;
                }
            }
        }

        self.inner.stop_countdown();
    }
}
