use thiserror::Error;

/// Errors that can occur while loading, running or evaluating a model.
#[derive(Debug, Error)]
pub enum Error {
    /// Artifact is neither a checkpoint nor a compiled module.
    #[error("unsupported model format: {reason}")]
    UnsupportedFormat {
        /// Reason for rejection.
        reason: String,
    },

    /// Checkpoint is missing required fields or carries bad weights.
    #[error("invalid checkpoint: {reason}")]
    InvalidCheckpoint {
        /// Reason for rejection.
        reason: String,
    },

    /// Compiled module loaded but its class count cannot be determined.
    #[error("unsupported architecture: {reason}")]
    UnsupportedArchitecture {
        /// Reason for rejection.
        reason: String,
    },

    /// No model has been loaded since startup or the last failed load.
    #[error("no model is currently loaded, load a model first")]
    ModelNotLoaded,

    /// Audio input could not be decoded or transformed.
    #[error("feature extraction failed: {reason}")]
    FeatureExtraction {
        /// Underlying decoder message.
        reason: String,
    },

    /// Model forward pass failed.
    #[error("forward pass failed: {0}")]
    ForwardPass(String),

    /// Prediction failed; wraps the underlying failure.
    #[error("inference failed: {0}")]
    Inference(Box<Error>),

    /// Dataset folder does not match any class label of the model.
    #[error("dataset folder '{folder}' does not match any of the model's class labels")]
    DatasetLabelMismatch {
        /// Offending folder name.
        folder: String,
    },

    /// Dataset contains no eligible audio files.
    #[error("dataset is empty or has an invalid structure")]
    EmptyDataset,

    /// Model defines neither class labels nor a class count.
    #[error("cannot run evaluation: model has no class labels or number of classes defined")]
    NoClassLabels,

    /// Dataset archive could not be read or extracted.
    #[error("invalid dataset archive: {0}")]
    Archive(String),

    /// ONNX Runtime library could not be initialized.
    #[error("failed to initialize ONNX Runtime: {0}")]
    RuntimeInit(String),

    /// Report export failed.
    #[error("export failed: {0}")]
    Export(String),

    /// Filesystem failure outside of per-file processing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an error raised during prediction.
    ///
    /// Errors that are already wrapped are returned unchanged.
    #[must_use]
    pub fn inference(source: Self) -> Self {
        match source {
            Self::Inference(_) => source,
            other => Self::Inference(Box::new(other)),
        }
    }

    /// The underlying failure for [`Error::Inference`], `self` otherwise.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Inference(inner) => inner.root(),
            other => other,
        }
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
