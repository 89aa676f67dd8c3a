//! Labeled dataset layout: one top-level folder per class label.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions treated as audio, compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 4] = ["wav", "mp3", "m4a", "flac"];

/// One audio file with its ground-truth label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledFile {
    /// Absolute path inside the workspace.
    pub path: PathBuf,
    /// Path relative to the dataset root, `/`-separated.
    pub relative: String,
    /// Name of the top-level folder.
    pub label: String,
}

/// Audio files of an extracted dataset, sorted by relative path.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    files: Vec<LabeledFile>,
}

impl Dataset {
    /// Validate the folder layout under `root` and collect its audio files.
    ///
    /// Every top-level folder must be one of `labels`. Files directly under
    /// `root` and non-audio files are ignored.
    ///
    /// # Errors
    /// - [`Error::DatasetLabelMismatch`] naming the first offending folder
    /// - [`Error::EmptyDataset`] if no audio file is found
    pub fn scan(root: &Path, labels: &[String]) -> Result<Self> {
        let mut folders = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                folders.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        folders.sort();
        if let Some(folder) = folders.iter().find(|f| !labels.contains(f)) {
            return Err(Error::DatasetLabelMismatch {
                folder: folder.clone(),
            });
        }

        let mut files = Vec::new();
        for folder in &folders {
            for entry in WalkDir::new(root.join(folder)).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::Io(e.into()))?;
                if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or_else(|_| entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(LabeledFile {
                    path: entry.path().to_path_buf(),
                    relative,
                    label: folder.clone(),
                });
            }
        }

        if files.is_empty() {
            return Err(Error::EmptyDataset);
        }
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        tracing::debug!(folders = folders.len(), files = files.len(), "dataset scanned");
        Ok(Self { files })
    }

    /// Files in relative-path order.
    #[must_use]
    pub fn files(&self) -> &[LabeledFile] {
        &self.files
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the dataset has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Per-label counts; every label appears, with zero if it has no files.
    #[must_use]
    pub fn files_per_class(&self, labels: &[String]) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> =
            labels.iter().map(|label| (label.clone(), 0)).collect();
        for file in &self.files {
            *counts.entry(file.label.clone()).or_default() += 1;
        }
        counts
    }
}

/// Whether `path` has one of [`AUDIO_EXTENSIONS`].
#[must_use]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
