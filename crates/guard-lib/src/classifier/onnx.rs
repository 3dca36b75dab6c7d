//! ONNX classifier using tract
//!
//! Loads an ECG classification model exported to ONNX. The model takes a
//! `[1, W, 1]` float tensor and returns `[1, C]` class probabilities.

use super::{check_width, ClassificationResult, Classifier, ClassifierError};
use crate::signal::SignalWindow;
use anyhow::Context;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const MAX_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-backed window classifier
pub struct OnnxClassifier {
    model: TractModel,
    window_size: usize,
    num_classes: Option<usize>,
    inference_count: AtomicU64,
}

impl OnnxClassifier {
    /// Load a model from raw bytes
    pub fn from_bytes(model_bytes: &[u8], window_size: usize) -> Result<Self, ClassifierError> {
        let model = Self::load_model(model_bytes, window_size)
            .map_err(|e| ClassifierError::ModelLoad(format!("{:#}", e)))?;

        let num_classes = model
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().map(|dims| dims.to_vec()))
            .and_then(|dims| dims.last().copied());

        debug!(window_size, num_classes = ?num_classes, "Classifier model loaded");

        Ok(Self {
            model,
            window_size,
            num_classes,
            inference_count: AtomicU64::new(0),
        })
    }

    /// Load a model asset from disk
    pub fn from_path(path: impl AsRef<Path>, window_size: usize) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            ClassifierError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes, window_size)
    }

    fn load_model(model_bytes: &[u8], window_size: usize) -> anyhow::Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, window_size, 1]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_count.load(Ordering::Relaxed)
    }

    fn run(&self, window: &SignalWindow) -> anyhow::Result<Vec<f32>> {
        let input: Tensor =
            tract_ndarray::Array3::from_shape_vec((1, self.window_size, 1), window.samples().to_vec())
                .context("Window does not match model input shape")?
                .into();

        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let view = output.to_array_view::<f32>()?;
        Ok(view.iter().copied().collect())
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, window: &SignalWindow) -> Result<ClassificationResult, ClassifierError> {
        if window.len() != self.window_size {
            return Err(ClassifierError::Classification(format!(
                "window has {} samples, model expects {}",
                window.len(),
                self.window_size
            )));
        }

        let start = Instant::now();
        let probabilities = self
            .run(window)
            .map_err(|e| ClassifierError::Classification(format!("{:#}", e)))?;

        check_width(&probabilities, self.num_classes)?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        }

        ClassificationResult::from_probabilities(probabilities)
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }
}

impl Drop for OnnxClassifier {
    fn drop(&mut self) {
        debug!(inferences = self.inference_count(), "Classifier released");
    }
}
