//! Caregiver alert escalation
//!
//! [`EscalationMachine`] is the synchronous dead-man's switch;
//! [`EscalationDriver`] wraps it with the countdown task and a snapshot
//! channel for the display.

mod driver;
mod machine;

pub use driver::{EscalationConfig, EscalationDriver};
pub use machine::{
    AlertPhase, AlertSession, EscalationError, EscalationMachine, PromptStep, Resolution,
    Transition, DEFAULT_COUNTDOWN_SECS,
};
