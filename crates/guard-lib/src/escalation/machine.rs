//! Alert lifecycle state machine
//!
//! Pure and synchronous: every input is a method call returning the
//! [`Transition`] it caused. Time only enters through [`EscalationMachine::tick`],
//! so the async driver owns the clock and tests can step it by hand.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Default countdown before help is dispatched automatically
pub const DEFAULT_COUNTDOWN_SECS: u32 = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscalationError {
    #[error("no alert is counting down")]
    NoActiveAlert,
}

/// Phase of the current alert session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    Idle,
    /// Danger observed and session opened; the countdown starts right after
    Armed,
    CountingDown,
    Resolved,
    AutoEscalated,
}

impl AlertPhase {
    /// Numeric value exported on the phase gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            AlertPhase::Idle => 0,
            AlertPhase::Armed => 1,
            AlertPhase::CountingDown => 2,
            AlertPhase::Resolved => 3,
            AlertPhase::AutoEscalated => 4,
        }
    }

    /// Whether the episode already reached an outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertPhase::Resolved | AlertPhase::AutoEscalated)
    }
}

/// How a caregiver closed the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    MedicationTaken,
    HelpRequested,
}

/// Question currently shown to the caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStep {
    /// "Has the patient taken the medication today?"
    AskMedication,
    /// Medication not taken, offer to request help now
    OfferHelp,
}

/// Snapshot of the alert session handed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertSession {
    pub phase: AlertPhase,
    pub remaining_seconds: u32,
    pub dismissed_for_episode: bool,
    pub prompt: PromptStep,
    pub resolution: Option<Resolution>,
    /// Incremented each time a new session is opened
    pub episode: u64,
}

impl AlertSession {
    fn idle(episode: u64) -> Self {
        Self {
            phase: AlertPhase::Idle,
            remaining_seconds: 0,
            dismissed_for_episode: false,
            prompt: PromptStep::AskMedication,
            resolution: None,
            episode,
        }
    }

    /// Whether the caregiver prompt should be on screen
    pub fn is_alerting(&self) -> bool {
        self.phase == AlertPhase::CountingDown
    }
}

impl Default for AlertSession {
    fn default() -> Self {
        Self::idle(0)
    }
}

/// Effect of one input on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Idle to Armed to CountingDown in one step
    CountdownStarted { episode: u64 },
    Ticked { remaining: u32 },
    Resolved(Resolution),
    AutoEscalated,
    /// Danger cleared, back to Idle with suppression lifted
    Cleared,
    PromptAdvanced,
    /// Danger persists on an episode that already has an outcome
    Suppressed,
}

impl Transition {
    /// Whether this transition ends the countdown
    pub fn stops_countdown(&self) -> bool {
        matches!(
            self,
            Transition::Resolved(_) | Transition::AutoEscalated | Transition::Cleared
        )
    }
}

/// The dead-man's switch
#[derive(Debug, Clone)]
pub struct EscalationMachine {
    session: AlertSession,
    countdown_secs: u32,
}

impl Default for EscalationMachine {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTDOWN_SECS)
    }
}

impl EscalationMachine {
    pub fn new(countdown_secs: u32) -> Self {
        Self {
            session: AlertSession::default(),
            countdown_secs,
        }
    }

    pub fn session(&self) -> &AlertSession {
        &self.session
    }

    pub fn phase(&self) -> AlertPhase {
        self.session.phase
    }

    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
    }

    /// Feed the danger flag of the latest synchronized status
    pub fn observe(&mut self, danger: bool) -> Transition {
        match (self.session.phase, danger) {
            (AlertPhase::Idle, true) if !self.session.dismissed_for_episode => {
                self.arm();
                self.start_countdown()
            }
            (AlertPhase::Idle, true) => Transition::Suppressed,
            (AlertPhase::Armed, true) => self.start_countdown(),
            (AlertPhase::CountingDown, true) => Transition::Unchanged,
            (AlertPhase::Resolved | AlertPhase::AutoEscalated, true) => Transition::Suppressed,
            (AlertPhase::Idle, false) => Transition::Unchanged,
            (_, false) => {
                self.session = AlertSession::idle(self.session.episode);
                Transition::Cleared
            }
        }
    }

    fn arm(&mut self) {
        self.session = AlertSession {
            phase: AlertPhase::Armed,
            episode: self.session.episode + 1,
            ..AlertSession::idle(self.session.episode)
        };
        debug!(episode = self.session.episode, "Alert session armed");
    }

    fn start_countdown(&mut self) -> Transition {
        self.session.phase = AlertPhase::CountingDown;
        self.session.remaining_seconds = self.countdown_secs;
        self.session.prompt = PromptStep::AskMedication;
        Transition::CountdownStarted {
            episode: self.session.episode,
        }
    }

    /// Advance the countdown by one tick
    ///
    /// Reaching zero escalates exactly once. Ticks outside `CountingDown`
    /// change nothing.
    pub fn tick(&mut self) -> Transition {
        if self.session.phase != AlertPhase::CountingDown {
            return Transition::Unchanged;
        }

        self.session.remaining_seconds = self.session.remaining_seconds.saturating_sub(1);
        if self.session.remaining_seconds == 0 {
            self.session.phase = AlertPhase::AutoEscalated;
            self.session.dismissed_for_episode = true;
            return Transition::AutoEscalated;
        }

        Transition::Ticked {
            remaining: self.session.remaining_seconds,
        }
    }

    /// Tick only if `episode` is still the current one
    ///
    /// A countdown task that outlived its episode must not touch the next.
    pub fn tick_episode(&mut self, episode: u64) -> Transition {
        if episode != self.session.episode {
            return Transition::Unchanged;
        }
        self.tick()
    }

    pub fn confirm_medication_taken(&mut self) -> Result<Transition, EscalationError> {
        self.resolve(Resolution::MedicationTaken)
    }

    /// Manual escalation, accepted from either prompt step
    pub fn request_help(&mut self) -> Result<Transition, EscalationError> {
        self.resolve(Resolution::HelpRequested)
    }

    /// Caregiver answered "no" to the medication question
    pub fn decline_medication(&mut self) -> Result<Transition, EscalationError> {
        if self.session.phase != AlertPhase::CountingDown {
            return Err(EscalationError::NoActiveAlert);
        }
        match self.session.prompt {
            PromptStep::AskMedication => {
                self.session.prompt = PromptStep::OfferHelp;
                Ok(Transition::PromptAdvanced)
            }
            PromptStep::OfferHelp => Ok(Transition::Unchanged),
        }
    }

    fn resolve(&mut self, resolution: Resolution) -> Result<Transition, EscalationError> {
        if self.session.phase != AlertPhase::CountingDown {
            return Err(EscalationError::NoActiveAlert);
        }
        self.session.phase = AlertPhase::Resolved;
        self.session.resolution = Some(resolution);
        self.session.dismissed_for_episode = true;
        Ok(Transition::Resolved(resolution))
    }
}
