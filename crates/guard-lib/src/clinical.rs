//! Clinical mapping of classifier output
//!
//! Turns a classification into simulated vitals and a danger flag. This is
//! a deterministic simulation policy, not a diagnostic algorithm: each class
//! owns fixed value ranges and the vitals are drawn uniformly inside them.

use crate::classifier::ClassificationResult;
use crate::models::{BloodPressure, ClinicalStatus, Region};
use chrono::Utc;
use rand::Rng;
use std::ops::RangeInclusive;

/// Label published to the shared store for a danger classification
pub const DANGER_WIRE_LABEL: &str = "VENTRICULAR DANGER";

/// Substrings that mark a published label as dangerous
pub const DANGER_MARKERS: &[&str] = &["DANGER", "VENTRICULAR", "ABNORMAL"];

/// Advisory shown before the store has answered
pub const PENDING_ADVISORY: &str = "Analyzing...";

/// Immediate escalation text for a danger reading
pub fn escalation_hint(region: Region) -> String {
    format!("DETECTED: {}", region.escalation_action())
}

/// Whether a published ECG label denotes a danger condition
pub fn is_danger_label(label: &str) -> bool {
    let upper = label.to_uppercase();
    DANGER_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Value ranges and flags attached to one ECG class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPolicy {
    pub label: &'static str,
    pub systolic: RangeInclusive<u16>,
    pub diastolic: RangeInclusive<u16>,
    pub spo2: RangeInclusive<u8>,
    pub is_danger: bool,
}

/// ECG classes known to the policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcgClass {
    Normal,
    Abnormal,
    /// Any class index the table does not cover
    Inconclusive,
}

impl EcgClass {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => EcgClass::Normal,
            1 => EcgClass::Abnormal,
            _ => EcgClass::Inconclusive,
        }
    }

    pub fn policy(&self) -> ClassPolicy {
        match self {
            EcgClass::Normal => ClassPolicy {
                label: "Normal",
                systolic: 125..=135,
                diastolic: 75..=85,
                spo2: 96..=99,
                is_danger: false,
            },
            EcgClass::Abnormal => ClassPolicy {
                label: "ABNORMALITY",
                systolic: 70..=90,
                diastolic: 40..=60,
                spo2: 82..=89,
                is_danger: true,
            },
            EcgClass::Inconclusive => ClassPolicy {
                label: "Inconclusive",
                systolic: 120..=120,
                diastolic: 80..=80,
                spo2: 98..=98,
                is_danger: false,
            },
        }
    }
}

/// Maps classifications to [`ClinicalStatus`] values
///
/// Only the patient's region is consulted, to phrase the escalation hint.
#[derive(Debug, Clone)]
pub struct ClinicalMapper {
    region: Region,
}

impl ClinicalMapper {
    pub fn new(region: Region) -> Self {
        Self { region }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn map(&self, result: &ClassificationResult) -> ClinicalStatus {
        self.map_index(result.argmax_index, &mut rand::thread_rng())
    }

    /// Map a class index using the supplied random source
    pub fn map_index<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> ClinicalStatus {
        let policy = EcgClass::from_index(index).policy();

        let blood_pressure = BloodPressure::new(
            rng.gen_range(policy.systolic.clone()),
            rng.gen_range(policy.diastolic.clone()),
        );
        let spo2_percent = rng.gen_range(policy.spo2.clone());

        let advisory_text = if policy.is_danger {
            self.escalation_hint()
        } else {
            PENDING_ADVISORY.to_string()
        };

        ClinicalStatus {
            ecg_label: policy.label.to_string(),
            blood_pressure,
            spo2_percent,
            is_danger: policy.is_danger,
            advisory_text,
            timestamp: Utc::now(),
        }
    }

    pub fn escalation_hint(&self) -> String {
        escalation_hint(self.region)
    }
}
