//! Turning confusion counts into a precision-recall curve.

use prcurve_core::Summarizable;

use crate::confusion::{ConfusionState, ThresholdCounts};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A finalized precision-recall curve.
///
/// `precision[i]` and `recall[i]` are measured at `thresholds[i]`, with
/// thresholds ascending, so the curve runs from the most permissive cut to
/// the most conservative one. The last entry of `precision`/`recall` is the
/// closing point `(1.0, 0.0)` beyond the largest threshold, hence
/// `precision.len() == recall.len() == thresholds.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl PrCurve {
    /// Number of thresholds (one less than the number of curve points).
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Whether the curve has no thresholds, i.e. only the closing point.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Iterate `(precision, recall, threshold)` with `None` as the threshold
    /// of the closing point.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64, Option<f64>)> + '_ {
        self.precision
            .iter()
            .zip(&self.recall)
            .enumerate()
            .map(|(i, (&p, &r))| (p, r, self.thresholds.get(i).copied()))
    }
}

impl Summarizable for PrCurve {
    fn summary(&self) -> String {
        match (self.thresholds.first(), self.thresholds.last()) {
            (Some(lo), Some(hi)) => format!(
                "PR curve: {} thresholds in [{:.4}, {:.4}], recall at lowest threshold {:.4}",
                self.len(),
                lo,
                hi,
                self.recall[0],
            ),
            _ => "PR curve: no thresholds".to_string(),
        }
    }
}

/// Compute precision and recall at every threshold of `counts`.
///
/// With no predicted positives at a threshold, precision is `1.0`. With
/// `total_positives == 0`, recall is `0.0` everywhere.
pub fn finalize_curve(counts: &ThresholdCounts, total_positives: u64) -> PrCurve {
    let n = counts.len();
    let mut precision = Vec::with_capacity(n + 1);
    let mut recall = Vec::with_capacity(n + 1);

    for (&tp, &fp) in counts.tp.iter().zip(&counts.fp) {
        let predicted = tp + fp;
        precision.push(if predicted == 0 {
            1.0
        } else {
            tp as f64 / predicted as f64
        });
        recall.push(if total_positives == 0 {
            0.0
        } else {
            tp as f64 / total_positives as f64
        });
    }

    precision.push(1.0);
    recall.push(0.0);

    PrCurve {
        precision,
        recall,
        thresholds: counts.thresholds.clone(),
    }
}

impl ConfusionState {
    /// Resolve and finalize this state using its own positive total.
    pub fn finalize(&self) -> PrCurve {
        let counts = self.counts();
        if counts.positives == 0 {
            log::warn!(
                "no positive samples among {} seen; recall is reported as 0",
                counts.positives + counts.negatives
            );
        }
        finalize_curve(&counts, counts.positives)
    }
}
