//! Interactive caregiver session
//!
//! Runs the status synchronizer and the escalation driver as separate
//! tasks, renders their snapshots and forwards stdin answers to the driver.

use anyhow::Result;
use guard_lib::escalation::{
    EscalationConfig, EscalationDriver, EscalationError, Transition,
};
use guard_lib::health::{components, ComponentStatus, HealthRegistry, HealthResponse};
use guard_lib::sync::{StatusStore, StatusSynchronizer, SyncConfig};
use guard_lib::{PatientStatus, StructuredLogger, DEFAULT_MEDICATION};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::output::{print_alert, print_error, print_info, print_warning, reading_line};

/// Options for `hg watch`
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub countdown_secs: u32,
    pub caregiver: String,
}

/// Answer typed by the caregiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaregiverCommand {
    ConfirmMedication,
    DeclineMedication,
    RequestHelp,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown answer '{0}', expected y, n, h or q")]
pub struct UnknownCommand(String);

impl FromStr for CaregiverCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "y" | "yes" => Ok(CaregiverCommand::ConfirmMedication),
            "n" | "no" => Ok(CaregiverCommand::DeclineMedication),
            "h" | "help" => Ok(CaregiverCommand::RequestHelp),
            "q" | "quit" | "exit" => Ok(CaregiverCommand::Quit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

impl CaregiverCommand {
    /// Forward the answer to the escalation driver
    pub fn apply(self, driver: &EscalationDriver) -> Result<Transition, EscalationError> {
        match self {
            CaregiverCommand::ConfirmMedication => driver.confirm_medication_taken(),
            CaregiverCommand::DeclineMedication => driver.decline_medication(),
            CaregiverCommand::RequestHelp => driver.request_help(),
            CaregiverCommand::Quit => Ok(Transition::Unchanged),
        }
    }
}

/// Follow the store until the caregiver quits or Ctrl-C
pub async fn run_watch(store: Arc<dyn StatusStore>, options: WatchOptions) -> Result<()> {
    let health = HealthRegistry::new();
    health.register(components::SYNCHRONIZER).await;
    health.register(components::ESCALATION).await;

    let (synchronizer, status_rx) = StatusSynchronizer::new(
        store,
        SyncConfig {
            poll_interval: options.poll_interval,
            request_timeout: options.request_timeout,
        },
    );
    let synchronizer = synchronizer.with_health(health.clone());
    let driver = EscalationDriver::with_health(
        EscalationConfig {
            countdown_secs: options.countdown_secs,
            ..EscalationConfig::default()
        },
        StructuredLogger::new(&options.caregiver),
        health.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sync_handle = tokio::spawn(synchronizer.run(shutdown_tx.subscribe()));
    let driver_handle = tokio::spawn(
        driver
            .clone()
            .run(status_rx.clone(), shutdown_tx.subscribe()),
    );

    print_info(&format!(
        "Watching as {}. Answer alerts with y, n or h; q quits.",
        options.caregiver
    ));

    let mut status_rx = status_rx;
    let mut alerts = driver.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(record) = status_rx.borrow_and_update().as_ref() {
                    println!("{}", reading_line(record));
                }
            }
            changed = alerts.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = alerts.borrow_and_update().clone();
                let (patient, medication) = prompt_subject(status_rx.borrow().as_ref());
                print_alert(&session, &patient, &medication);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<CaregiverCommand>() {
                        Ok(CaregiverCommand::Quit) => break,
                        Ok(command) => {
                            if let Err(e) = command.apply(&driver) {
                                print_warning(&e.to_string());
                            }
                        }
                        Err(e) => print_error(&e.to_string()),
                    },
                    // Keep following the store without interactive input
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    let _ = shutdown_tx.send(());
    let _ = sync_handle.await;
    let _ = driver_handle.await;
    for warning in health_warnings(&health.health().await) {
        print_warning(&warning);
    }
    print_info("Stopped watching");
    Ok(())
}

fn prompt_subject(record: Option<&PatientStatus>) -> (String, String) {
    match record {
        Some(record) => (
            record.patient_name.clone(),
            record.medication_or_default().to_string(),
        ),
        None => ("the patient".to_string(), DEFAULT_MEDICATION.to_string()),
    }
}

/// One line per component that did not end the session healthy
fn health_warnings(health: &HealthResponse) -> Vec<String> {
    health
        .components
        .iter()
        .filter(|(_, c)| c.status != ComponentStatus::Healthy)
        .map(|(name, c)| match &c.message {
            Some(message) => format!(
                "{} {:?} since {}: {}",
                name,
                c.status,
                c.since.format("%H:%M:%S"),
                message
            ),
            None => format!("{} {:?}", name, c.status),
        })
        .collect()
}
