//! Class label synthesis and resolution.

use crate::error::{Error, Result};
use crate::types::ModelMetadata;
use std::collections::HashSet;

/// Label used for an output index that has no declared label.
#[must_use]
pub fn synthetic_label(index: usize) -> String {
    format!("Class_{index}")
}

/// Labels `Class_0..Class_{n-1}`.
#[must_use]
pub fn synthesize_labels(num_classes: usize) -> Vec<String> {
    (0..num_classes).map(synthetic_label).collect()
}

/// Check declared labels against the class count.
///
/// Labels must be unique and there must be exactly one per output class.
/// Returns the reason for the first violation.
pub(crate) fn check_class_labels(
    labels: &[String],
    num_classes: usize,
) -> std::result::Result<(), String> {
    if labels.len() != num_classes {
        return Err(format!(
            "{} class labels declared for {num_classes} classes",
            labels.len()
        ));
    }
    let mut seen = HashSet::with_capacity(labels.len());
    if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
        return Err(format!("class label '{duplicate}' is declared more than once"));
    }
    Ok(())
}

/// Label set an evaluation is validated and scored against.
///
/// Declared labels are sorted lexicographically. Without declared labels the
/// set is synthesized from the class count.
///
/// # Errors
/// Returns [`Error::NoClassLabels`] if the model declares no labels and has
/// no classes.
pub fn resolve_evaluation_labels(metadata: &ModelMetadata) -> Result<Vec<String>> {
    match metadata.class_labels.as_deref() {
        Some(labels) if !labels.is_empty() => {
            let mut sorted = labels.to_vec();
            sorted.sort();
            Ok(sorted)
        }
        _ if metadata.num_classes > 0 => Ok(synthesize_labels(metadata.num_classes)),
        _ => Err(Error::NoClassLabels),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::types::ConfidenceLevel;

    fn metadata(num_classes: usize, class_labels: Option<Vec<&str>>) -> ModelMetadata {
        ModelMetadata {
            model_type_and_architecture: "stub".to_string(),
            num_classes,
            class_labels: class_labels
                .map(|labels| labels.into_iter().map(str::to_string).collect()),
            sample_rate: 16_000,
            num_trainable_parameters: 0,
            model_loading_timestamp: String::new(),
            confidence_level: ConfidenceLevel::Medium,
        }
    }

    #[test]
    fn test_synthesize_labels() {
        assert_eq!(synthesize_labels(3), vec!["Class_0", "Class_1", "Class_2"]);
        assert!(synthesize_labels(0).is_empty());
    }

    #[test]
    fn test_resolve_sorts_declared_labels() {
        let labels =
            resolve_evaluation_labels(&metadata(3, Some(vec!["Tram", "Bus", "Park"]))).unwrap();
        assert_eq!(labels, vec!["Bus", "Park", "Tram"]);
    }

    #[test]
    fn test_resolve_synthesizes_without_labels() {
        let labels = resolve_evaluation_labels(&metadata(2, None)).unwrap();
        assert_eq!(labels, vec!["Class_0", "Class_1"]);
    }

    #[test]
    fn test_resolve_treats_empty_labels_as_absent() {
        let labels = resolve_evaluation_labels(&metadata(2, Some(vec![]))).unwrap();
        assert_eq!(labels, vec!["Class_0", "Class_1"]);
    }

    fn owned(labels: &[&str]) -> Vec<String> {
        labels.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_check_class_labels_accepts_unique_full_set() {
        assert!(check_class_labels(&owned(&["bus", "park"]), 2).is_ok());
    }

    #[test]
    fn test_check_class_labels_rejects_duplicates() {
        let reason = check_class_labels(&owned(&["cat", "cat"]), 2).unwrap_err();
        assert!(reason.contains("'cat'"));
    }

    #[test]
    fn test_check_class_labels_rejects_count_mismatch() {
        let reason = check_class_labels(&owned(&["cat", "dog"]), 3).unwrap_err();
        assert!(reason.contains("2 class labels"));
        assert!(check_class_labels(&[], 1).is_err());
    }

    #[test]
    fn test_resolve_fails_without_labels_or_classes() {
        let result = resolve_evaluation_labels(&metadata(0, None));
        assert!(matches!(result, Err(Error::NoClassLabels)));
    }
}
