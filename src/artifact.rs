//! Artifact format detection.
//!
//! A JSON document carrying `model_state_dict` is a checkpoint. Anything
//! else is handed to ONNX Runtime as a compiled module.

use crate::checkpoint::{Checkpoint, CheckpointDocument};
use crate::compiled::CompiledModule;
use crate::error::{Error, Result};
use crate::model::SceneModel;
use serde_json::error::Category;
use std::sync::Arc;

/// Artifact kinds the registry accepts.
#[derive(Debug)]
pub enum ModelArtifact {
    /// Named weights for the scene CNN.
    Checkpoint(Checkpoint),
    /// Self-contained ONNX graph.
    CompiledModule(CompiledModule),
}

impl ModelArtifact {
    /// Identify and parse an artifact.
    ///
    /// # Errors
    /// - [`Error::InvalidCheckpoint`] for checkpoints with missing metadata
    /// - [`Error::UnsupportedFormat`] for bytes that are neither format
    /// - [`Error::UnsupportedArchitecture`] for modules without a usable output
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if looks_like_json(bytes) {
            let doc = parse_document(bytes)?;
            return Checkpoint::from_document(doc).map(Self::Checkpoint);
        }
        if bytes.is_empty() {
            return Err(Error::UnsupportedFormat {
                reason: "artifact is empty".to_string(),
            });
        }
        CompiledModule::from_bytes(bytes).map(Self::CompiledModule)
    }

    /// Short kind name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Checkpoint(_) => "checkpoint",
            Self::CompiledModule(_) => "compiled module",
        }
    }

    /// Build the runnable model.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCheckpoint`] if checkpoint weights do not fit
    /// the network.
    pub fn into_model(self) -> Result<Arc<dyn SceneModel>> {
        match self {
            Self::Checkpoint(checkpoint) => Ok(Arc::new(checkpoint.into_model()?)),
            Self::CompiledModule(module) => Ok(Arc::new(module)),
        }
    }
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

fn parse_document(bytes: &[u8]) -> Result<CheckpointDocument> {
    serde_json::from_slice(bytes).map_err(|e| match e.classify() {
        Category::Data => Error::InvalidCheckpoint {
            reason: format!("malformed checkpoint field: {e}"),
        },
        Category::Io | Category::Syntax | Category::Eof => Error::UnsupportedFormat {
            reason: format!("artifact is not valid JSON: {e}"),
        },
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::testutil::{checkpoint_bytes, checkpoint_document};

    #[test]
    fn test_detects_checkpoint() {
        let artifact = ModelArtifact::detect(&checkpoint_bytes(&checkpoint_document(2, &[0.0, 1.0])))
            .unwrap();
        assert_eq!(artifact.kind(), "checkpoint");
        let model = artifact.into_model().unwrap();
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_json_without_state_dict_is_unsupported() {
        let err = ModelArtifact::detect(br#"{"num_classes": 3}"#).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_truncated_json_is_unsupported() {
        let err = ModelArtifact::detect(br#"{"model_state_dict": {"#).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_mistyped_field_is_invalid_checkpoint() {
        let err =
            ModelArtifact::detect(br#"{"model_state_dict": {}, "num_classes": "ten"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint { .. }));
    }

    #[test]
    fn test_missing_num_classes_is_invalid_checkpoint() {
        let err = ModelArtifact::detect(br#" {"model_state_dict": {}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidCheckpoint { .. }));
    }

    #[test]
    fn test_empty_bytes_are_unsupported() {
        assert!(matches!(
            ModelArtifact::detect(b""),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_looks_like_json() {
        assert!(looks_like_json(b"  \n{}"));
        assert!(!looks_like_json(b"\x08\x07onnx"));
        assert!(!looks_like_json(b""));
    }
}
