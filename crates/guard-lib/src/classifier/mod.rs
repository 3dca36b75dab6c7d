//! ECG window classification
//!
//! The classifier itself is an external model; the core only depends on
//! its contract: a fixed-length window in, one probability per class out.

mod onnx;

pub use onnx::OnnxClassifier;

use crate::signal::SignalWindow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifier failures. Both are fatal to a monitoring session.
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("classification failed: {0}")]
    Classification(String),
}

/// Trait for window classifiers
///
/// The session owns its classifier and drops it when the session ends, so
/// implementations release their resources in `Drop`.
pub trait Classifier: Send + Sync {
    /// Map one window to a probability vector over the label set
    fn classify(&self, window: &SignalWindow) -> Result<ClassificationResult, ClassifierError>;

    /// Size of the label set, when the model declares it
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&self, window: &SignalWindow) -> Result<ClassificationResult, ClassifierError> {
        (**self).classify(window)
    }

    fn num_classes(&self) -> Option<usize> {
        (**self).num_classes()
    }
}

/// Raw class probabilities plus the winning class index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub probabilities: Vec<f32>,
    pub argmax_index: usize,
}

impl ClassificationResult {
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, ClassifierError> {
        let argmax_index = argmax(&probabilities).ok_or_else(|| {
            ClassifierError::Classification(format!(
                "no usable probability in output of {} values",
                probabilities.len()
            ))
        })?;
        Ok(Self {
            probabilities,
            argmax_index,
        })
    }

    /// Probability of the winning class
    pub fn confidence(&self) -> f32 {
        self.probabilities[self.argmax_index]
    }
}

/// Reject an output whose width disagrees with the declared label set
pub fn check_width(
    probabilities: &[f32],
    num_classes: Option<usize>,
) -> Result<(), ClassifierError> {
    match num_classes {
        Some(expected) if probabilities.len() != expected => {
            Err(ClassifierError::Classification(format!(
                "model produced {} values, expected {}",
                probabilities.len(),
                expected
            )))
        }
        _ => Ok(()),
    }
}

/// Index of the maximum value, ties going to the lowest index. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
