//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use guard_lib::escalation::{AlertPhase, AlertSession, PromptStep, Resolution};
use guard_lib::PatientStatus;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Row for the status table
#[derive(Tabled, Serialize)]
pub struct StatusRow {
    #[tabled(rename = "Patient")]
    pub patient: String,
    #[tabled(rename = "ECG")]
    pub ecg: String,
    #[tabled(rename = "BP")]
    pub blood_pressure: String,
    #[tabled(rename = "SpO2")]
    pub spo2: String,
    #[tabled(rename = "Medication")]
    pub medication: String,
    #[tabled(rename = "Recorded")]
    pub recorded_at: String,
}

impl StatusRow {
    pub fn from_record(record: &PatientStatus) -> Self {
        Self {
            patient: record.patient_name.clone(),
            ecg: record.status.ecg_label.clone(),
            blood_pressure: record.status.blood_pressure.to_string(),
            spo2: format!("{}%", record.status.spo2_percent),
            medication: record.medication_or_default().to_string(),
            recorded_at: record.status.timestamp.format("%H:%M:%S").to_string(),
        }
    }
}

/// Print a status record in the requested format
pub fn print_status(record: &PatientStatus, format: OutputFormat) {
    let row = StatusRow::from_record(record);
    match format {
        OutputFormat::Table => {
            let table = Table::new([row]).with(Style::rounded()).to_string();
            println!("{}", table);
            if !record.status.advisory_text.is_empty() {
                println!("{} {}", "Analysis:".bold(), record.status.advisory_text);
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(record) {
                println!("{}", json);
            }
        }
    }
}

/// One-line summary printed on every synchronized update
pub fn reading_line(record: &PatientStatus) -> String {
    let status = &record.status;
    let label = if status.is_danger {
        status.ecg_label.red().bold().to_string()
    } else {
        status.ecg_label.green().to_string()
    };
    format!(
        "[{}] {}  ECG {}  BP {}  SpO2 {}%",
        status.timestamp.format("%H:%M:%S"),
        record.patient_name.cyan(),
        label,
        status.blood_pressure,
        status.spo2_percent
    )
}

/// Caregiver-facing text for an alert snapshot, `None` when nothing to say
pub fn alert_text(session: &AlertSession, patient: &str, medication: &str) -> Option<String> {
    match session.phase {
        AlertPhase::Idle | AlertPhase::Armed => None,
        AlertPhase::CountingDown => {
            let question = match session.prompt {
                PromptStep::AskMedication => format!(
                    "HEALTH ALERT: severe cardiac change detected for {}.\n\
                     Has the patient taken '{}' today? [y]es / [n]o / [h]elp",
                    patient, medication
                ),
                PromptStep::OfferHelp => "ACTION NEEDED: can the patient take the medication now?\n\
                     If help is needed press [h] to REQUEST HELP NOW, or [y] once taken."
                    .to_string(),
            };
            Some(format!(
                "{}\nAutomatic help request in: {}s",
                question, session.remaining_seconds
            ))
        }
        AlertPhase::Resolved => Some(match session.resolution {
            Some(Resolution::HelpRequested) => "MANUAL ALERT SENT!".to_string(),
            _ => "Recorded: medication taken. Rest is recommended.".to_string(),
        }),
        AlertPhase::AutoEscalated => {
            Some("TIME'S UP: help requested automatically!".to_string())
        }
    }
}

/// Print an alert snapshot with urgency colors
pub fn print_alert(session: &AlertSession, patient: &str, medication: &str) {
    let Some(text) = alert_text(session, patient, medication) else {
        return;
    };
    match session.phase {
        AlertPhase::CountingDown => println!("{}", text.red().bold()),
        AlertPhase::AutoEscalated => print_warning(&text),
        _ => print_success(&text),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use guard_lib::escalation::EscalationMachine;
    use guard_lib::{BloodPressure, ClinicalStatus, PatientProfile};

    fn record() -> PatientStatus {
        PatientStatus::from_profile(
            &PatientProfile::default(),
            ClinicalStatus {
                ecg_label: "VENTRICULAR DANGER".to_string(),
                blood_pressure: BloodPressure::new(84, 52),
                spo2_percent: 87,
                is_danger: true,
                advisory_text: String::new(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 15, 0).unwrap(),
            },
        )
    }

    #[test]
    fn test_status_row() {
        let row = StatusRow::from_record(&record());
        assert_eq!(row.blood_pressure, "84/52");
        assert_eq!(row.spo2, "87%");
        assert_eq!(row.medication, "Losartan 50mg");
        assert_eq!(row.recorded_at, "09:15:00");
    }

    #[test]
    fn test_alert_text_follows_prompt_steps() {
        let mut machine = EscalationMachine::default();
        assert!(alert_text(machine.session(), "Sr. João", "Losartan 50mg").is_none());

        machine.observe(true);
        let ask = alert_text(machine.session(), "Sr. João", "Losartan 50mg").unwrap();
        assert!(ask.contains("'Losartan 50mg'"));
        assert!(ask.contains("60s"));

        machine.decline_medication().unwrap();
        let offer = alert_text(machine.session(), "Sr. João", "Losartan 50mg").unwrap();
        assert!(offer.contains("REQUEST HELP NOW"));

        machine.request_help().unwrap();
        let sent = alert_text(machine.session(), "Sr. João", "Losartan 50mg").unwrap();
        assert_eq!(sent, "MANUAL ALERT SENT!");
    }

    #[test]
    fn test_alert_text_after_expiry() {
        let mut machine = EscalationMachine::new(1);
        machine.observe(true);
        machine.tick();
        let text = alert_text(machine.session(), "Sr. João", "x").unwrap();
        assert!(text.contains("automatically"));
    }
}
