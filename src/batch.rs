//! Sequential batch prediction with per-file error isolation.

use crate::audio::AudioSource;
use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::types::{BatchResultItem, BatchStatus, PredictionResult};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An uploaded file: original name plus encoded bytes.
#[derive(Clone)]
pub struct BatchFile {
    /// Name the file was submitted under.
    pub filename: String,
    /// Encoded audio.
    pub data: Vec<u8>,
}

impl BatchFile {
    /// New batch file.
    #[must_use]
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

impl std::fmt::Debug for BatchFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFile")
            .field("filename", &self.filename)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Runs predictions over many files, one at a time.
///
/// Each uploaded file is staged in its own temporary file, which is removed
/// before the next file starts. A failing file never aborts the batch.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    engine: InferenceEngine,
    temp_dir: Option<PathBuf>,
}

impl BatchRunner {
    /// Runner staging files in the system temp directory.
    #[must_use]
    pub const fn new(engine: InferenceEngine) -> Self {
        Self {
            engine,
            temp_dir: None,
        }
    }

    /// Stage files under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Predict every uploaded file, in order.
    ///
    /// The result has exactly one item per input, in input order.
    #[must_use]
    pub fn run(&self, files: &[BatchFile]) -> Vec<BatchResultItem> {
        Self::collect(files.iter().map(|file| {
            let outcome = self.predict_staged(file);
            (file.filename.clone(), outcome)
        }))
    }

    /// Predict files that are already on disk, in order.
    #[must_use]
    pub fn run_paths(&self, paths: &[PathBuf]) -> Vec<BatchResultItem> {
        Self::collect(paths.iter().map(|path| {
            let filename = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            (filename, self.engine.predict(&AudioSource::from(path.as_path())))
        }))
    }

    fn collect(
        outcomes: impl Iterator<Item = (String, Result<PredictionResult>)>,
    ) -> Vec<BatchResultItem> {
        let items: Vec<BatchResultItem> = outcomes
            .map(|(filename, outcome)| {
                match &outcome {
                    Ok(prediction) => tracing::info!(
                        file = %filename,
                        class = %prediction.predicted_class,
                        confidence = prediction.confidence,
                        "batch item predicted"
                    ),
                    Err(e) => tracing::warn!(file = %filename, error = %e, "batch item failed"),
                }
                BatchResultItem::from_outcome(filename, outcome)
            })
            .collect();

        let failed = items
            .iter()
            .filter(|item| item.status == BatchStatus::Error)
            .count();
        tracing::info!(total = items.len(), failed, "batch complete");
        items
    }

    fn predict_staged(&self, file: &BatchFile) -> Result<PredictionResult> {
        let suffix = Path::new(&file.filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("scene-eval-").suffix(&suffix);
        let mut staged = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        staged.write_all(&file.data)?;
        staged.flush()?;

        // `staged` is removed when it drops at the end of this call.
        self.engine.predict(&AudioSource::from(staged.path()))
    }
}
