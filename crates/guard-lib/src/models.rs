//! Core data models shared by the wearable and companion roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Medication name used when the store has none registered for the patient
pub const DEFAULT_MEDICATION: &str = "the prescribed medication";

/// Region category of the patient, selects the escalation route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Region {
    Urban,
    RemoteRural,
}

impl Region {
    /// Action hint shown to the patient when danger is detected
    pub fn escalation_action(&self) -> &'static str {
        match self {
            Region::Urban => "CALLING EMERGENCY SERVICES (192)...",
            Region::RemoteRural => "CONNECTING TO TELEMEDICINE...",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Urban => write!(f, "URBAN"),
            Region::RemoteRural => write!(f, "REMOTE_RURAL"),
        }
    }
}

/// Static patient configuration, read-only for a monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub name: String,
    pub has_pacemaker: bool,
    pub region: Region,
    pub target_systolic: u16,
    pub target_diastolic: u16,
    pub medication: String,
}

impl Default for PatientProfile {
    fn default() -> Self {
        Self {
            name: "Sr. João".to_string(),
            has_pacemaker: true,
            region: Region::RemoteRural,
            target_systolic: 130,
            target_diastolic: 80,
            medication: "Losartan 50mg".to_string(),
        }
    }
}

/// Blood pressure pair in mmHg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

impl BloodPressure {
    pub fn new(systolic: u16, diastolic: u16) -> Self {
        Self {
            systolic,
            diastolic,
        }
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

impl FromStr for BloodPressure {
    type Err = String;

    /// Parses the `SYS/DIA` display form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sys, dia) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("blood pressure '{}' is not SYS/DIA", s))?;
        let systolic = sys
            .trim()
            .parse()
            .map_err(|_| format!("invalid systolic value '{}'", sys))?;
        let diastolic = dia
            .trim()
            .parse()
            .map_err(|_| format!("invalid diastolic value '{}'", dia))?;
        Ok(Self::new(systolic, diastolic))
    }
}

/// Simulated vitals for one classification cycle
///
/// Immutable once produced: the publishing side hands a copy to the store
/// and the observing side keeps its own copy of the last value received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalStatus {
    pub ecg_label: String,
    pub blood_pressure: BloodPressure,
    pub spo2_percent: u8,
    pub is_danger: bool,
    pub advisory_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ClinicalStatus {
    /// Copy of this status carrying a different advisory text
    pub fn with_advisory(&self, advisory_text: impl Into<String>) -> Self {
        Self {
            advisory_text: advisory_text.into(),
            ..self.clone()
        }
    }
}

/// Record exchanged through the shared status store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientStatus {
    pub patient_name: String,
    /// Only known on the publishing side, the store does not echo it back
    pub region: Option<Region>,
    pub medication: Option<String>,
    pub status: ClinicalStatus,
}

impl PatientStatus {
    pub fn from_profile(profile: &PatientProfile, status: ClinicalStatus) -> Self {
        Self {
            patient_name: profile.name.clone(),
            region: Some(profile.region),
            medication: Some(profile.medication.clone()),
            status,
        }
    }

    /// Medication name for caregiver prompts
    pub fn medication_or_default(&self) -> &str {
        match self.medication.as_deref() {
            Some(m) if !m.trim().is_empty() => m,
            _ => DEFAULT_MEDICATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_pressure_display_and_parse() {
        let bp = BloodPressure::new(128, 79);
        assert_eq!(bp.to_string(), "128/79");
        assert_eq!("128/79".parse::<BloodPressure>().unwrap(), bp);
        assert_eq!(" 85 / 50 ".parse::<BloodPressure>().unwrap(), BloodPressure::new(85, 50));
    }

    #[test]
    fn test_blood_pressure_parse_rejects_placeholder() {
        assert!("--/--".parse::<BloodPressure>().is_err());
        assert!("120".parse::<BloodPressure>().is_err());
    }

    #[test]
    fn test_region_escalation_action() {
        assert!(Region::Urban.escalation_action().contains("192"));
        assert!(Region::RemoteRural.escalation_action().contains("TELEMEDICINE"));
        assert_eq!(Region::RemoteRural.to_string(), "REMOTE_RURAL");
    }

    #[test]
    fn test_medication_fallback() {
        let status = ClinicalStatus {
            ecg_label: "Normal".to_string(),
            blood_pressure: BloodPressure::new(120, 80),
            spo2_percent: 98,
            is_danger: false,
            advisory_text: String::new(),
            timestamp: Utc::now(),
        };
        let mut record = PatientStatus::from_profile(&PatientProfile::default(), status);
        assert_eq!(record.medication_or_default(), "Losartan 50mg");

        record.medication = Some("  ".to_string());
        assert_eq!(record.medication_or_default(), DEFAULT_MEDICATION);
    }
}
