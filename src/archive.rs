//! Bounded zip extraction.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

const MAX_ZIP_ENTRIES: usize = 100_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 16 * 1024 * 1024 * 1024;
const MAX_ZIP_COMPRESSION_RATIO: u64 = 200;

/// Limits enforced while extracting a dataset archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Maximum uncompressed size of one entry.
    pub max_entry_uncompressed_bytes: u64,
    /// Maximum uncompressed size of the whole archive.
    pub max_total_uncompressed_bytes: u64,
    /// Maximum uncompressed/compressed ratio of one entry.
    pub max_compression_ratio: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: MAX_ZIP_ENTRIES,
            max_entry_uncompressed_bytes: MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES,
            max_total_uncompressed_bytes: MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES,
            max_compression_ratio: MAX_ZIP_COMPRESSION_RATIO,
        }
    }
}

/// Extract every entry of a zip archive under `dest_dir`.
///
/// Entries whose names escape `dest_dir` are skipped.
///
/// # Errors
/// Returns [`Error::Archive`] if the archive is unreadable or breaks a limit,
/// and [`Error::Io`] if writing fails.
pub fn extract_zip<R: Read + Seek>(
    reader: R,
    dest_dir: &Path,
    limits: ExtractionLimits,
) -> Result<usize> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| Error::Archive(format!("not a zip archive: {e}")))?;
    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(Error::Archive(format!(
            "archive has {entry_count} entries, limit is {}",
            limits.max_entries
        )));
    }

    let mut total_uncompressed: u64 = 0;
    let mut written = 0;
    for i in 0..entry_count {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Archive(e.to_string()))?;
        let uncompressed_size = entry.size();
        if uncompressed_size > limits.max_entry_uncompressed_bytes {
            return Err(Error::Archive(format!(
                "entry '{}' is too large ({uncompressed_size} bytes, limit {})",
                entry.name(),
                limits.max_entry_uncompressed_bytes
            )));
        }
        if uncompressed_size > 0 {
            let max_uncompressed = entry
                .compressed_size()
                .saturating_mul(limits.max_compression_ratio);
            if uncompressed_size > max_uncompressed {
                return Err(Error::Archive(format!(
                    "entry '{}' exceeds compression ratio limit",
                    entry.name()
                )));
            }
        }
        total_uncompressed = total_uncompressed
            .checked_add(uncompressed_size)
            .ok_or_else(|| Error::Archive("archive size overflow".to_string()))?;
        if total_uncompressed > limits.max_total_uncompressed_bytes {
            return Err(Error::Archive(format!(
                "extracted size {total_uncompressed} exceeds limit {}",
                limits.max_total_uncompressed_bytes
            )));
        }

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping archive entry outside workspace");
            continue;
        };
        let outpath = dest_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut outfile)?;
        written += 1;
    }

    tracing::debug!(entries = entry_count, files = written, "archive extracted");
    Ok(written)
}
