//! Wearable configuration

use anyhow::{Context, Result};
use guard_lib::{PatientProfile, Region};
use serde::Deserialize;
use std::time::Duration;

/// Config file looked up next to the binary when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "heartguard";

/// Wearable configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WearableConfig {
    /// Device identifier attached to every log line
    #[serde(default = "default_device_id")]
    pub device_id: String,

    #[serde(default = "default_patient_name")]
    pub patient_name: String,

    #[serde(default = "default_has_pacemaker")]
    pub has_pacemaker: bool,

    /// `URBAN` or `REMOTE_RURAL`
    #[serde(default = "default_region")]
    pub region: Region,

    #[serde(default = "default_target_systolic")]
    pub target_systolic: u16,

    #[serde(default = "default_target_diastolic")]
    pub target_diastolic: u16,

    #[serde(default = "default_medication")]
    pub medication: String,

    /// Base URL of the shared status store
    #[serde(default = "default_store_url")]
    pub store_url: String,

    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Text file with one sample per line
    #[serde(default = "default_samples_path")]
    pub samples_path: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_beat_interval_ms")]
    pub beat_interval_ms: u64,

    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_device_id() -> String {
    "wearable-01".to_string()
}

fn default_patient_name() -> String {
    PatientProfile::default().name
}

fn default_has_pacemaker() -> bool {
    PatientProfile::default().has_pacemaker
}

fn default_region() -> Region {
    PatientProfile::default().region
}

fn default_target_systolic() -> u16 {
    PatientProfile::default().target_systolic
}

fn default_target_diastolic() -> u16 {
    PatientProfile::default().target_diastolic
}

fn default_medication() -> String {
    PatientProfile::default().medication
}

fn default_store_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_model_path() -> String {
    "assets/ecg_model.onnx".to_string()
}

fn default_samples_path() -> String {
    "assets/ecg_samples.txt".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_window_size() -> usize {
    guard_lib::signal::DEFAULT_WINDOW_SIZE
}

fn default_beat_interval_ms() -> u64 {
    2000
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

impl WearableConfig {
    /// Load configuration from an optional file and `HEARTGUARD_*` variables
    ///
    /// Environment variables win over the file.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::File::with_name(file.unwrap_or(DEFAULT_CONFIG_FILE))
                    .required(file.is_some()),
            )
            .add_source(config::Environment::with_prefix("HEARTGUARD").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: WearableConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            anyhow::bail!("window_size must be positive");
        }
        if self.beat_interval_ms == 0 {
            anyhow::bail!("beat_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn patient_profile(&self) -> PatientProfile {
        PatientProfile {
            name: self.patient_name.clone(),
            has_pacemaker: self.has_pacemaker,
            region: self.region,
            target_systolic: self.target_systolic,
            target_diastolic: self.target_diastolic,
            medication: self.medication.clone(),
        }
    }

    pub fn beat_interval(&self) -> Duration {
        Duration::from_millis(self.beat_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
            patient_name = "Dona Maria"
            region = "URBAN"
            has_pacemaker = false
            store_url = "http://store.local:8000/api"
            beat_interval_ms = 1000
            "#,
        );

        let config = WearableConfig::load(file.path().to_str()).unwrap();
        let profile = config.patient_profile();
        assert_eq!(profile.name, "Dona Maria");
        assert_eq!(profile.region, Region::Urban);
        assert!(!profile.has_pacemaker);
        assert_eq!(profile.medication, "Losartan 50mg");
        assert_eq!(config.beat_interval(), Duration::from_secs(1));
        assert_eq!(config.window_size, 360);
        assert_eq!(config.publish_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_region_rejected() {
        let file = write_config(r#"region = "SUBURBAN""#);
        assert!(WearableConfig::load(file.path().to_str()).is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let file = write_config("window_size = 0");
        assert!(WearableConfig::load(file.path().to_str()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(WearableConfig::load(Some("/nonexistent/heartguard.toml")).is_err());
    }
}
