//! Sample loading
//!
//! One numeric sample per line. Blank and non-numeric lines are dropped
//! here so the window driver only ever sees valid samples.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to read samples from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, immutable sequence of biosignal samples
#[derive(Debug, Clone, Default)]
pub struct SignalSource {
    samples: Arc<[f32]>,
}

impl SignalSource {
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Parse samples from a line-oriented reader
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut samples = Vec::new();
        let mut malformed = 0usize;

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.parse::<f32>() {
                Ok(value) if value.is_finite() => samples.push(value),
                _ => malformed += 1,
            }
        }

        if malformed > 0 {
            debug!(malformed, kept = samples.len(), "Dropped malformed sample lines");
        }

        Ok(Self::from_samples(samples))
    }

    /// Load samples from a file on disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SignalError> {
        let path = path.as_ref();
        let io_err = |source| SignalError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        Self::from_reader(std::io::BufReader::new(file)).map_err(io_err)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub(crate) fn shared(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }
}
