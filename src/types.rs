use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// How much of the model metadata was declared by the artifact itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    /// Labels and class count declared explicitly.
    High,
    /// Class count known, labels absent or synthesized.
    Medium,
    /// Metadata largely inferred.
    Low,
}

impl ConfidenceLevel {
    /// Display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// Read-only snapshot describing the active model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Human-readable architecture description.
    pub model_type_and_architecture: String,
    /// Number of output classes.
    pub num_classes: usize,
    /// Class labels ordered by model output position.
    pub class_labels: Option<Vec<String>>,
    /// Sample rate the model expects, in Hz.
    pub sample_rate: u32,
    /// Number of trainable parameters.
    pub num_trainable_parameters: u64,
    /// RFC 3339 UTC timestamp of the load.
    pub model_loading_timestamp: String,
    /// Provenance of the metadata.
    pub confidence_level: ConfidenceLevel,
}

impl ModelMetadata {
    /// Label for a model output index, synthesizing `Class_<index>` when the
    /// label list is absent or too short.
    #[must_use]
    pub fn label_for(&self, index: usize) -> String {
        self.class_labels
            .as_ref()
            .and_then(|labels| labels.get(index))
            .cloned()
            .unwrap_or_else(|| crate::labels::synthetic_label(index))
    }
}

/// Single-file prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Arg-max label.
    pub predicted_class: String,
    /// Softmax probability of the predicted class, rounded to 4 decimals.
    pub confidence: f32,
    /// Softmax probability for every class label.
    pub all_class_confidences: BTreeMap<String, f32>,
}

/// Outcome of one file inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Prediction succeeded.
    Success,
    /// Prediction failed; see `error_message`.
    Error,
}

impl BatchStatus {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One entry of a batch result, one-to-one with the submitted files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResultItem {
    /// Name the file was submitted under.
    pub filename: String,
    /// Success or error.
    pub status: BatchStatus,
    /// Present only on success.
    pub prediction: Option<PredictionResult>,
    /// Present only on error.
    pub error_message: Option<String>,
}

impl BatchResultItem {
    /// Build an item from a per-file outcome.
    #[must_use]
    pub fn from_outcome(filename: impl Into<String>, outcome: crate::Result<PredictionResult>) -> Self {
        let filename = filename.into();
        match outcome {
            Ok(prediction) => Self {
                filename,
                status: BatchStatus::Success,
                prediction: Some(prediction),
                error_message: None,
            },
            Err(e) => Self {
                filename,
                status: BatchStatus::Error,
                prediction: None,
                error_message: Some(e.to_string()),
            },
        }
    }
}

/// Precision/recall/F1/support for one row of a classification report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// `TP / (TP + FP)`, 0 when undefined.
    pub precision: f64,
    /// `TP / (TP + FN)`, 0 when undefined.
    pub recall: f64,
    /// Harmonic mean of precision and recall, 0 when undefined.
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    /// Number of true samples.
    pub support: usize,
}

/// Per-label metrics plus macro and weighted averages.
///
/// Serializes as a single JSON object keyed by label, `"macro avg"` and
/// `"weighted avg"`, in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Rows in sorted label order.
    pub per_class: Vec<(String, ClassMetrics)>,
    /// Unweighted mean over labels.
    pub macro_avg: ClassMetrics,
    /// Support-weighted mean over labels.
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Key used for the macro-average row.
    pub const MACRO_AVG: &'static str = "macro avg";
    /// Key used for the weighted-average row.
    pub const WEIGHTED_AVG: &'static str = "weighted avg";

    /// Look up a row by label or average key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ClassMetrics> {
        match key {
            Self::MACRO_AVG => Some(&self.macro_avg),
            Self::WEIGHTED_AVG => Some(&self.weighted_avg),
            _ => self
                .per_class
                .iter()
                .find(|(label, _)| label == key)
                .map(|(_, metrics)| metrics),
        }
    }
}

impl Serialize for ClassificationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.per_class.len() + 2))?;
        for (label, metrics) in &self.per_class {
            map.serialize_entry(label, metrics)?;
        }
        map.serialize_entry(Self::MACRO_AVG, &self.macro_avg)?;
        map.serialize_entry(Self::WEIGHTED_AVG, &self.weighted_avg)?;
        map.end()
    }
}

/// File counts of the evaluated dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    /// Number of eligible audio files.
    pub total_files: usize,
    /// Eligible files per resolved label (zero for labels without a folder).
    pub files_per_class: BTreeMap<String, usize>,
}

/// A dataset file left out of the metrics because prediction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedFile {
    /// Path relative to the dataset root.
    pub path: String,
    /// Failure message.
    pub error: String,
}

/// Result of evaluating a model on a labeled dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Exact-match rate over files that produced a prediction.
    pub overall_accuracy: f64,
    /// Per-label and averaged metrics.
    pub classification_report: ClassificationReport,
    /// Row = true label, column = predicted label, sorted label order.
    pub confusion_matrix: Vec<Vec<usize>>,
    /// Dataset file counts.
    pub dataset_statistics: DatasetStatistics,
    /// Files whose prediction failed.
    pub excluded_files: Vec<ExcludedFile>,
}
