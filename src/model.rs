//! Capability surface shared by every loaded model.

use crate::error::Result;
use crate::features::FeatureTensor;
use crate::types::ConfidenceLevel;

/// A classifier the registry can hold.
///
/// Implementations must not mutate their parameters in [`forward`], so one
/// instance can serve concurrent predictions.
///
/// [`forward`]: SceneModel::forward
pub trait SceneModel: Send + Sync {
    /// Raw class logits for a single feature tensor (batch size 1).
    ///
    /// # Errors
    /// Returns an error if the forward pass fails.
    fn forward(&self, features: &FeatureTensor) -> Result<Vec<f32>>;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Labels ordered by output position, if the model declares them.
    fn class_labels(&self) -> Option<&[String]>;

    /// Sample rate the model was trained on, if declared.
    fn sample_rate(&self) -> Option<u32> {
        None
    }

    /// Human-readable architecture description.
    fn architecture(&self) -> String;

    /// Number of trainable parameters.
    fn trainable_parameters(&self) -> u64 {
        0
    }

    /// How much of the metadata is explicit.
    fn confidence_level(&self) -> ConfidenceLevel {
        if self.class_labels().is_some() {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Low
        }
    }
}
