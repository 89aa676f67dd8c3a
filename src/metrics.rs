//! Classification metrics over (true, predicted) label pairs.

use crate::types::{ClassMetrics, ClassificationReport};
use std::collections::HashMap;

/// Confusion matrix over a fixed, ordered label set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    /// Row-major counts (`truth * K + predicted`).
    counts: Vec<usize>,
}

impl ConfusionMatrix {
    /// Tally `pairs`; pairs naming a label outside `labels` are ignored.
    #[must_use]
    pub fn from_pairs(labels: &[String], pairs: &[(String, String)]) -> Self {
        let k = labels.len();
        let index: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), i))
            .collect();
        let mut counts = vec![0; k * k];
        for (truth, predicted) in pairs {
            if let (Some(&t), Some(&p)) = (index.get(truth.as_str()), index.get(predicted.as_str())) {
                counts[t * k + p] += 1;
            }
        }
        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    /// Label order of rows and columns.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Count for a (truth, predicted) index pair.
    #[must_use]
    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth * self.labels.len() + predicted]
    }

    /// Rows as nested vectors.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<usize>> {
        let k = self.labels.len();
        if k == 0 {
            return Vec::new();
        }
        self.counts.chunks(k).map(<[usize]>::to_vec).collect()
    }
}

/// Fraction of pairs whose labels match, 0.0 for no pairs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy(pairs: &[(String, String)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let correct = pairs.iter().filter(|(t, p)| t == p).count();
    correct as f64 / pairs.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / sum
    }
}

/// Per-label precision, recall, F1 and support plus macro and weighted averages.
///
/// Undefined ratios (zero denominators) are reported as 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classification_report(labels: &[String], pairs: &[(String, String)]) -> ClassificationReport {
    let per_class: Vec<(String, ClassMetrics)> = labels
        .iter()
        .map(|label| {
            let tp = pairs.iter().filter(|(t, p)| t == label && p == label).count();
            let predicted = pairs.iter().filter(|(_, p)| p == label).count();
            let support = pairs.iter().filter(|(t, _)| t == label).count();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            (
                label.clone(),
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1(precision, recall),
                    support,
                },
            )
        })
        .collect();

    let total_support: usize = per_class.iter().map(|(_, m)| m.support).sum();
    let n = per_class.len() as f64;
    let mean = |field: fn(&ClassMetrics) -> f64| {
        if per_class.is_empty() {
            0.0
        } else {
            per_class.iter().map(|(_, m)| field(m)).sum::<f64>() / n
        }
    };
    let weighted = |field: fn(&ClassMetrics) -> f64| {
        if total_support == 0 {
            0.0
        } else {
            per_class
                .iter()
                .map(|(_, m)| field(m) * m.support as f64)
                .sum::<f64>()
                / total_support as f64
        }
    };

    let macro_avg = ClassMetrics {
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1_score: mean(|m| m.f1_score),
        support: total_support,
    };
    let weighted_avg = ClassMetrics {
        precision: weighted(|m| m.precision),
        recall: weighted(|m| m.recall),
        f1_score: weighted(|m| m.f1_score),
        support: total_support,
    };

    ClassificationReport {
        per_class,
        macro_avg,
        weighted_avg,
    }
}
