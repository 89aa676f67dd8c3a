//! Batch result export.

use crate::error::{Error, Result};
use crate::types::BatchResultItem;
use std::io::Write;

const HEADER: [&str; 5] = [
    "Filename",
    "Status",
    "Predicted Class",
    "Confidence",
    "Error Message",
];

/// Write batch results as CSV. Absent values are empty cells.
///
/// # Errors
/// Returns [`Error::Export`] if a record cannot be written and [`Error::Io`]
/// if flushing fails.
pub fn write_batch_csv<W: Write>(writer: W, items: &[BatchResultItem]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADER).map_err(export_error)?;
    for item in items {
        let (class, confidence) = item
            .prediction
            .as_ref()
            .map(|p| (p.predicted_class.clone(), p.confidence.to_string()))
            .unwrap_or_default();
        csv.write_record([
            item.filename.as_str(),
            item.status.as_str(),
            class.as_str(),
            confidence.as_str(),
            item.error_message.as_deref().unwrap_or_default(),
        ])
        .map_err(export_error)?;
    }
    csv.flush()?;
    Ok(())
}

/// Batch results rendered as a CSV string.
///
/// # Errors
/// Returns [`Error::Export`] if rendering fails.
pub fn batch_csv_string(items: &[BatchResultItem]) -> Result<String> {
    let mut buffer = Vec::new();
    write_batch_csv(&mut buffer, items)?;
    String::from_utf8(buffer).map_err(|e| Error::Export(e.to_string()))
}

fn export_error(e: csv::Error) -> Error {
    Error::Export(e.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::types::PredictionResult;
    use std::collections::BTreeMap;

    #[test]
    fn test_csv_layout() {
        let items = vec![
            BatchResultItem::from_outcome(
                "a.wav",
                Ok(PredictionResult {
                    predicted_class: "park".to_string(),
                    confidence: 0.75,
                    all_class_confidences: BTreeMap::new(),
                }),
            ),
            BatchResultItem::from_outcome("b, c.wav", Err(Error::EmptyDataset)),
        ];

        let csv = batch_csv_string(&items).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "Filename,Status,Predicted Class,Confidence,Error Message");
        assert_eq!(lines[1], "a.wav,success,park,0.75,");
        assert_eq!(
            lines[2],
            "\"b, c.wav\",error,,,dataset is empty or has an invalid structure"
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_batch_has_header_only() {
        let csv = batch_csv_string(&[]).unwrap();
        assert_eq!(csv.trim_end(), "Filename,Status,Predicted Class,Confidence,Error Message");
    }
}
