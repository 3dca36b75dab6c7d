//! HTTP client for the remote status store
//!
//! Speaks the backend's JSON schema: `POST analyze` to publish vitals and
//! `GET latest_status` to read the most recent record.

use super::{StatusStore, StoreError, StoreReply};
use crate::clinical::{is_danger_label, DANGER_WIRE_LABEL};
use crate::models::{BloodPressure, ClinicalStatus, PatientStatus};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timestamp layout used on the wire
const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Body of `POST analyze`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSignsPayload {
    pub patient_name: String,
    pub ecg_status: String,
    pub bp_value: String,
    pub spo2_value: String,
    pub location_type: String,
    pub timestamp: String,
}

impl VitalSignsPayload {
    pub fn from_record(record: &PatientStatus) -> Self {
        let status = &record.status;
        // Danger readings go out under the escalated label so the backend
        // triggers its own notification path
        let ecg_status = if status.is_danger {
            DANGER_WIRE_LABEL.to_string()
        } else {
            status.ecg_label.clone()
        };

        Self {
            patient_name: record.patient_name.clone(),
            ecg_status,
            bp_value: status.blood_pressure.to_string(),
            spo2_value: format!("{}%", status.spo2_percent),
            location_type: record
                .region
                .map(|r| r.to_string())
                .unwrap_or_default(),
            timestamp: status.timestamp.format(WIRE_TIME_FORMAT).to_string(),
        }
    }
}

/// Body of the `GET latest_status` answer
#[derive(Debug, Clone, Deserialize)]
pub struct LatestStatusResponse {
    #[serde(rename = "Paciente")]
    pub patient: String,
    #[serde(rename = "ECG")]
    pub ecg: String,
    #[serde(rename = "PA")]
    pub blood_pressure: String,
    #[serde(rename = "SpO2")]
    pub spo2: String,
    #[serde(rename = "Analise_IA", default)]
    pub analysis: String,
    #[serde(rename = "Medicacao_Cadastrada", default)]
    pub medication: Option<String>,
    #[serde(rename = "Data", default)]
    pub recorded_at: Option<String>,
}

impl LatestStatusResponse {
    /// Decode the display strings back into a typed record
    pub fn into_record(self) -> Result<PatientStatus, StoreError> {
        let blood_pressure: BloodPressure = self
            .blood_pressure
            .parse()
            .map_err(StoreError::Decode)?;
        let spo2_percent = self
            .spo2
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<u8>()
            .map_err(|_| StoreError::Decode(format!("invalid SpO2 value '{}'", self.spo2)))?;

        let timestamp = self
            .recorded_at
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s.trim(), WIRE_TIME_FORMAT).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now);

        Ok(PatientStatus {
            patient_name: self.patient,
            region: None,
            medication: self.medication.filter(|m| !m.trim().is_empty()),
            status: ClinicalStatus {
                is_danger: is_danger_label(&self.ecg),
                ecg_label: self.ecg,
                blood_pressure,
                spo2_percent,
                advisory_text: self.analysis,
                timestamp,
            },
        })
    }
}

/// Remote store reached over HTTP
pub struct HttpStatusStore {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpStatusStore {
    /// Create a client for the store at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid store URL")?;
        // Relative joins drop the last path segment unless it ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Connection(format!("invalid path {}: {}", path, e)))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Connection(e.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatusStore for HttpStatusStore {
    async fn push(&self, record: &PatientStatus) -> Result<StoreReply, StoreError> {
        let url = self.endpoint("analyze")?;
        let payload = VitalSignsPayload::from_record(record);

        debug!(url = %url, ecg_status = %payload.ecg_status, "Pushing vitals");

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.read_json(response).await
    }

    async fn pull(&self) -> Result<PatientStatus, StoreError> {
        let url = self.endpoint("latest_status")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        // The backend answers `null` until the first reading arrives
        let latest: Option<LatestStatusResponse> = self.read_json(response).await?;
        latest.ok_or(StoreError::Empty)?.into_record()
    }
}
