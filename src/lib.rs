//! # scene-eval
//!
//! Load, run and evaluate acoustic scene classification models.
//!
//! ## Pipeline
//!
//! - **Features**: any decodable audio file becomes a `128 x 512` log-mel
//!   tensor (Slaney mel scale, 2048-point FFT, hop 512, dB relative to peak).
//! - **Models**: a JSON checkpoint for the built-in scene CNN, or a compiled
//!   ONNX module run through ONNX Runtime.
//! - **Inference**: softmax over the logits, arg-max label, confidence
//!   rounded to four decimals.
//! - **Evaluation**: a zip archive with one folder per class label is scored
//!   for accuracy, per-class precision/recall/F1 and a confusion matrix.
//!
//! ## Example
//!
//! ```ignore
//! use scene_eval::{AudioSource, EvaluationOrchestrator, InferenceEngine, ModelRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ModelRegistry::new());
//! registry.load_file("scene_cnn.json")?;
//!
//! let engine = InferenceEngine::new(Arc::clone(&registry));
//! let result = engine.predict(&AudioSource::from(std::path::Path::new("street.wav")))?;
//! println!("{} ({:.1}%)", result.predicted_class, result.confidence * 100.0);
//!
//! let report = EvaluationOrchestrator::new(registry).evaluate_file("dataset.zip")?;
//! println!("accuracy: {:.3}", report.overall_accuracy);
//! ```

// Crate-level lint configuration
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![deny(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

mod archive;
mod artifact;
mod audio;
mod batch;
mod checkpoint;
mod compiled;
mod dataset;
mod engine;
mod error;
mod evaluation;
mod export;
mod features;
mod labels;
mod metrics;
mod model;
mod postprocess;
mod registry;
mod runtime;
#[cfg(test)]
mod testutil;
mod types;

pub use archive::ExtractionLimits;
pub use artifact::ModelArtifact;
pub use audio::{AudioSource, DecodedAudio, MAX_SAMPLE_RATE, decode, load_mono, resample_linear};
pub use batch::{BatchFile, BatchRunner};
pub use checkpoint::{Checkpoint, CheckpointDocument, SceneCnn, TensorEntry};
pub use compiled::CompiledModule;
pub use dataset::{AUDIO_EXTENSIONS, Dataset, LabeledFile, is_audio_file};
pub use engine::InferenceEngine;
pub use error::{Error, Result};
pub use evaluation::{EvaluationOrchestrator, EvaluatorBuilder};
pub use export::{batch_csv_string, write_batch_csv};
pub use features::{
    DB_FLOOR, FeatureTensor, HOP_LENGTH, N_FFT, N_MELS, TARGET_FRAMES, extract,
    features_from_samples,
};
pub use labels::{resolve_evaluation_labels, synthesize_labels};
pub use metrics::{ConfusionMatrix, accuracy, classification_report};
pub use model::SceneModel;
pub use postprocess::{argmax, softmax};
pub use registry::{DEFAULT_SAMPLE_RATE, ModelRegistry};
pub use runtime::{find_ort_library, init_runtime};
pub use types::{
    BatchResultItem, BatchStatus, ClassMetrics, ClassificationReport, ConfidenceLevel,
    DatasetStatistics, EvaluationReport, ExcludedFile, ModelMetadata, PredictionResult,
};
