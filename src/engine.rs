//! Single-file inference against the active model.

use crate::audio::AudioSource;
use crate::error::{Error, Result};
use crate::features;
use crate::postprocess::prediction_from_logits;
use crate::registry::ModelRegistry;
use crate::types::PredictionResult;
use std::sync::Arc;

/// Runs predictions with whatever model the registry holds at call time.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
}

impl InferenceEngine {
    /// Engine bound to `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this engine reads from.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Predict the scene class of one audio source.
    ///
    /// # Errors
    /// Returns [`Error::Inference`] wrapping [`Error::ModelNotLoaded`],
    /// [`Error::FeatureExtraction`] or [`Error::ForwardPass`].
    pub fn predict(&self, source: &AudioSource) -> Result<PredictionResult> {
        self.predict_inner(source).map_err(Error::inference)
    }

    fn predict_inner(&self, source: &AudioSource) -> Result<PredictionResult> {
        let (model, metadata) = self.registry.get_active()?;
        let features = features::extract(source, metadata.sample_rate)?;
        let logits = model.forward(&features)?;
        if logits.len() != metadata.num_classes {
            tracing::debug!(
                logits = logits.len(),
                num_classes = metadata.num_classes,
                "logit count differs from declared class count"
            );
        }
        let prediction = prediction_from_logits(&logits, &metadata)?;
        tracing::debug!(
            source = %source.display_name(),
            class = %prediction.predicted_class,
            confidence = prediction.confidence,
            "prediction"
        );
        Ok(prediction)
    }
}
