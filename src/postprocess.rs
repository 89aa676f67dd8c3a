//! Prediction post-processing: softmax, arg-max and label mapping

use crate::error::{Error, Result};
use crate::types::{ModelMetadata, PredictionResult};
use std::collections::BTreeMap;

/// Decimal places kept on the reported confidence.
const CONFIDENCE_DECIMALS: i32 = 4;

/// Numerically stable softmax.
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; ties resolve to the lowest index.
#[must_use]
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Round to the reported number of decimals.
#[must_use]
pub fn round_confidence(value: f32) -> f32 {
    let scale = 10f32.powi(CONFIDENCE_DECIMALS);
    (value * scale).round() / scale
}

/// Turn raw logits into a labeled prediction.
///
/// # Errors
/// Returns [`Error::ForwardPass`] if the logits are empty or not finite.
pub fn prediction_from_logits(logits: &[f32], metadata: &ModelMetadata) -> Result<PredictionResult> {
    if logits.is_empty() {
        return Err(Error::ForwardPass("model produced no logits".to_string()));
    }
    if let Some(index) = logits.iter().position(|x| !x.is_finite()) {
        return Err(Error::ForwardPass(format!(
            "model produced a non-finite logit at index {index}"
        )));
    }

    let probabilities = softmax(logits);
    let top = argmax(&probabilities)
        .ok_or_else(|| Error::ForwardPass("model produced no logits".to_string()))?;

    let all_class_confidences: BTreeMap<String, f32> = probabilities
        .iter()
        .enumerate()
        .map(|(index, &p)| (metadata.label_for(index), p))
        .collect();

    Ok(PredictionResult {
        predicted_class: metadata.label_for(top),
        confidence: round_confidence(probabilities[top]),
        all_class_confidences,
    })
}
