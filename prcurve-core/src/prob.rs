//! Probability transforms for raw model scores.
//!
//! Binary and multilabel scores are squashed with the logistic function
//! unless every value lies strictly inside `(0, 1)`. Multiclass scores are
//! row-normalized with softmax unless every row is already a probability
//! distribution. Both transforms are computed in a form that cannot
//! overflow for large-magnitude logits.

use crate::{PrCurveError, Result};

/// Absolute tolerance on a row sum for it to count as a distribution.
pub const DISTRIBUTION_TOL: f64 = 1e-6;

/// Logistic function `1 / (1 + e^-x)`.
///
/// Evaluated through `e^x / (1 + e^x)` for negative inputs so neither branch
/// exponentiates a large positive number.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Whether `x` is a probability, i.e. lies in the closed interval `[0, 1]`.
#[inline]
pub fn is_probability(x: f64) -> bool {
    (0.0..=1.0).contains(&x)
}

/// Whether every value in `scores` is a probability.
pub fn all_probabilities(scores: &[f64]) -> bool {
    scores.iter().all(|&s| is_probability(s))
}

/// Whether every value in `scores` lies in the open interval `(0, 1)`.
///
/// A hard `0.0` or `1.0` is read as a logit here, not as a probability.
pub fn all_open_probabilities(scores: &[f64]) -> bool {
    scores.iter().all(|&s| s > 0.0 && s < 1.0)
}

/// Whether `row` is a probability distribution: every entry in `[0, 1]` and
/// the entries sum to one within [`DISTRIBUTION_TOL`].
pub fn is_distribution(row: &[f64]) -> bool {
    all_probabilities(row) && (row.iter().sum::<f64>() - 1.0).abs() <= DISTRIBUTION_TOL
}

/// Apply the logistic function to every value.
pub fn sigmoid_in_place(scores: &mut [f64]) {
    for s in scores.iter_mut() {
        *s = sigmoid(*s);
    }
}

/// Softmax of a single row, shifted by the row maximum for stability.
pub fn softmax_in_place(row: &mut [f64]) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return;
    }
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

/// Squash a binary batch (or one multilabel column) to probabilities.
///
/// Returns `true` if the logistic transform was applied, which happens when
/// any value lies outside `(0, 1)`. Either every value is transformed or
/// none is.
pub fn squash_binary(scores: &mut [f64]) -> bool {
    if all_open_probabilities(scores) {
        return false;
    }
    sigmoid_in_place(scores);
    true
}

/// Squash a row-major multiclass batch (`n_rows × n_cols`) so that every row
/// is a distribution.
///
/// Returns `true` if softmax was applied. As with [`squash_binary`] the
/// decision covers the whole batch.
///
/// # Errors
///
/// Returns an error if `n_cols` is zero or does not divide `scores.len()`.
pub fn squash_multiclass(scores: &mut [f64], n_cols: usize) -> Result<bool> {
    if n_cols == 0 || scores.len() % n_cols != 0 {
        return Err(PrCurveError::ShapeMismatch(format!(
            "{} scores cannot be split into rows of {}",
            scores.len(),
            n_cols
        )));
    }
    if scores.chunks_exact(n_cols).all(is_distribution) {
        return Ok(false);
    }
    for row in scores.chunks_exact_mut(n_cols) {
        softmax_in_place(row);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn sigmoid_known_values() {
        assert!((sigmoid(0.0) - 0.5).abs() < TOL);
        assert!((sigmoid(2.0) - 1.0 / (1.0 + (-2.0_f64).exp())).abs() < TOL);
        assert!((sigmoid(-2.0) + sigmoid(2.0) - 1.0).abs() < TOL);
    }

    #[test]
    fn sigmoid_extreme_logits() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn probability_bounds_are_closed() {
        assert!(is_probability(0.0));
        assert!(is_probability(1.0));
        assert!(!is_probability(-1e-9));
        assert!(!is_probability(1.0 + 1e-9));
        assert!(!is_probability(f64::NAN));
    }

    #[test]
    fn squash_binary_leaves_probabilities_alone() {
        let mut scores = vec![0.01, 0.25, 0.99];
        assert!(!squash_binary(&mut scores));
        assert_eq!(scores, vec![0.01, 0.25, 0.99]);
    }

    #[test]
    fn squash_binary_treats_hard_endpoints_as_logits() {
        let mut scores = vec![0.0, 0.3, 1.0];
        assert!(squash_binary(&mut scores));
        assert_eq!(scores, vec![0.5, sigmoid(0.3), sigmoid(1.0)]);
    }

    #[test]
    fn squash_binary_empty_is_untouched() {
        let mut scores: Vec<f64> = vec![];
        assert!(!squash_binary(&mut scores));
    }

    #[test]
    fn squash_binary_transforms_whole_batch() {
        let mut scores = vec![0.5, 3.0];
        assert!(squash_binary(&mut scores));
        assert!((scores[0] - sigmoid(0.5)).abs() < TOL);
        assert!((scores[1] - sigmoid(3.0)).abs() < TOL);
    }

    #[test]
    fn softmax_row_sums_to_one() {
        let mut row = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut row);
        assert!((row.iter().sum::<f64>() - 1.0).abs() < TOL);
        assert!(row[0] < row[1] && row[1] < row[2]);
    }

    #[test]
    fn squash_multiclass_keeps_distributions() {
        let mut scores = vec![0.2, 0.3, 0.5, 0.1, 0.1, 0.8];
        assert!(!squash_multiclass(&mut scores, 3).unwrap());
        assert_eq!(scores, vec![0.2, 0.3, 0.5, 0.1, 0.1, 0.8]);
    }

    #[test]
    fn squash_multiclass_normalizes_when_any_row_is_off() {
        // second row is in range but does not sum to one
        let mut scores = vec![0.2, 0.3, 0.5, 0.1, 0.1, 0.1];
        assert!(squash_multiclass(&mut scores, 3).unwrap());
        for row in scores.chunks_exact(3) {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < TOL);
        }
        let third = 1.0 / 3.0;
        assert!(scores[3..].iter().all(|&v| (v - third).abs() < TOL));
    }

    #[test]
    fn squash_multiclass_bad_width() {
        let mut scores = vec![0.5; 5];
        assert!(squash_multiclass(&mut scores, 2).is_err());
        assert!(squash_multiclass(&mut scores, 0).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn sigmoid_is_monotone_probability(a in -50.0f64..50.0, b in -50.0f64..50.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(is_probability(sigmoid(lo)));
            prop_assert!(sigmoid(lo) <= sigmoid(hi));
        }

        #[test]
        fn softmax_rows_are_distributions(
            rows in proptest::collection::vec(proptest::collection::vec(-30.0f64..30.0, 4), 1..16)
        ) {
            let mut flat: Vec<f64> = rows.into_iter().flatten().collect();
            squash_multiclass(&mut flat, 4).unwrap();
            for row in flat.chunks_exact(4) {
                prop_assert!(is_distribution(row));
            }
        }
    }
}
