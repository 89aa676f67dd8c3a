//! Dataset evaluation: extract, validate, predict, score.

use crate::archive::{ExtractionLimits, extract_zip};
use crate::audio::AudioSource;
use crate::dataset::Dataset;
use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::labels::resolve_evaluation_labels;
use crate::metrics::{ConfusionMatrix, accuracy, classification_report};
use crate::registry::ModelRegistry;
use crate::types::{DatasetStatistics, EvaluationReport, ExcludedFile};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builder for [`EvaluationOrchestrator`].
#[derive(Debug)]
pub struct EvaluatorBuilder {
    registry: Arc<ModelRegistry>,
    workspace_root: Option<PathBuf>,
    limits: ExtractionLimits,
}

impl EvaluatorBuilder {
    /// Start a builder for evaluations against `registry`.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            workspace_root: None,
            limits: ExtractionLimits::default(),
        }
    }

    /// Create workspaces under `root` instead of the system temp directory.
    #[must_use]
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Override archive extraction limits.
    #[must_use]
    pub const fn extraction_limits(mut self, limits: ExtractionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the orchestrator.
    #[must_use]
    pub fn build(self) -> EvaluationOrchestrator {
        EvaluationOrchestrator {
            engine: InferenceEngine::new(Arc::clone(&self.registry)),
            registry: self.registry,
            workspace_root: self.workspace_root,
            limits: self.limits,
        }
    }
}

/// Scores the active model against a labeled dataset archive.
///
/// Each evaluation extracts into its own temporary workspace, removed when
/// the call returns on every path.
#[derive(Debug, Clone)]
pub struct EvaluationOrchestrator {
    registry: Arc<ModelRegistry>,
    engine: InferenceEngine,
    workspace_root: Option<PathBuf>,
    limits: ExtractionLimits,
}

impl EvaluationOrchestrator {
    /// Orchestrator with default settings.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        EvaluatorBuilder::new(registry).build()
    }

    /// Create a builder.
    #[must_use]
    pub fn builder(registry: Arc<ModelRegistry>) -> EvaluatorBuilder {
        EvaluatorBuilder::new(registry)
    }

    /// Evaluate a zip archive held in memory.
    ///
    /// # Errors
    /// - [`crate::Error::ModelNotLoaded`] / [`crate::Error::NoClassLabels`] before any extraction
    /// - [`crate::Error::Archive`] if the archive cannot be extracted
    /// - [`crate::Error::DatasetLabelMismatch`] / [`crate::Error::EmptyDataset`] for bad layouts
    pub fn evaluate(&self, archive: &[u8]) -> Result<EvaluationReport> {
        self.evaluate_reader(Cursor::new(archive))
    }

    /// Evaluate a zip archive on disk.
    ///
    /// # Errors
    /// Same as [`EvaluationOrchestrator::evaluate`], plus [`crate::Error::Io`] if the
    /// file cannot be opened.
    pub fn evaluate_file(&self, path: impl AsRef<Path>) -> Result<EvaluationReport> {
        self.evaluate_reader(File::open(path.as_ref())?)
    }

    /// Evaluate a zip archive from any seekable reader.
    ///
    /// # Errors
    /// Same as [`EvaluationOrchestrator::evaluate`].
    pub fn evaluate_reader<R: Read + Seek>(&self, reader: R) -> Result<EvaluationReport> {
        let (_, metadata) = self.registry.get_active()?;
        let labels = resolve_evaluation_labels(&metadata)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("scene-eval-dataset-");
        let workspace = match &self.workspace_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tracing::info!(
            workspace = %workspace.path().display(),
            labels = labels.len(),
            "evaluation started"
        );

        let report = self.evaluate_in(workspace.path(), reader, &labels);
        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "failed to remove evaluation workspace");
        }
        report
    }

    fn evaluate_in<R: Read + Seek>(
        &self,
        workspace: &Path,
        reader: R,
        labels: &[String],
    ) -> Result<EvaluationReport> {
        extract_zip(reader, workspace, self.limits)?;
        let dataset = Dataset::scan(workspace, labels)?;

        let mut pairs = Vec::with_capacity(dataset.len());
        let mut excluded_files = Vec::new();
        for (i, file) in dataset.files().iter().enumerate() {
            match self.engine.predict(&AudioSource::from(file.path.as_path())) {
                Ok(prediction) => pairs.push((file.label.clone(), prediction.predicted_class)),
                Err(e) => {
                    tracing::warn!(file = %file.relative, error = %e, "excluding file from evaluation");
                    excluded_files.push(ExcludedFile {
                        path: file.relative.clone(),
                        error: e.to_string(),
                    });
                }
            }
            tracing::debug!(done = i + 1, total = dataset.len(), "evaluation progress");
        }

        let report = EvaluationReport {
            overall_accuracy: accuracy(&pairs),
            classification_report: classification_report(labels, &pairs),
            confusion_matrix: ConfusionMatrix::from_pairs(labels, &pairs).to_rows(),
            dataset_statistics: DatasetStatistics {
                total_files: dataset.len(),
                files_per_class: dataset.files_per_class(labels),
            },
            excluded_files,
        };
        tracing::info!(
            files = dataset.len(),
            predicted = pairs.len(),
            excluded = report.excluded_files.len(),
            accuracy = report.overall_accuracy,
            "evaluation complete"
        );
        Ok(report)
    }
}
