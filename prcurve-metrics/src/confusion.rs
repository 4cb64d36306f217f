//! Per-threshold confusion counts with incremental, mergeable state.
//!
//! A [`ConfusionState`] is a running value that the caller threads through
//! repeated [`accumulate`] calls and, in a distributed setting, folds
//! together with [`merge_states`]. Counts are plain integers, so the final
//! curve is bit-for-bit the same however the samples were batched or
//! sharded.

use prcurve_core::{Mergeable, PrCurveError, Result};

use crate::thresholds::{ThresholdMode, ThresholdSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resolved counts
// ---------------------------------------------------------------------------

/// The per-threshold table both accumulator modes resolve into.
///
/// `tp[i]` and `fp[i]` count positive and negative samples with
/// `score >= thresholds[i]`. Thresholds are ascending, so both columns are
/// non-increasing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdCounts {
    /// Ascending thresholds.
    pub thresholds: Vec<f64>,
    /// True positives at each threshold.
    pub tp: Vec<u64>,
    /// False positives at each threshold.
    pub fp: Vec<u64>,
    /// Total actual positives seen.
    pub positives: u64,
    /// Total actual negatives seen.
    pub negatives: u64,
}

impl ThresholdCounts {
    /// Number of thresholds.
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// False negatives at each threshold: `positives - tp`.
    pub fn false_negatives(&self) -> Vec<u64> {
        self.tp.iter().map(|&tp| self.positives - tp).collect()
    }

    /// Predicted positives at each threshold: `tp + fp`.
    pub fn predicted_positives(&self) -> Vec<u64> {
        self.tp.iter().zip(&self.fp).map(|(&tp, &fp)| tp + fp).collect()
    }
}

// ---------------------------------------------------------------------------
// Running state
// ---------------------------------------------------------------------------

/// Raw (score, is_positive) pairs buffered for exact-threshold mode.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleBuffer {
    scores: Vec<f64>,
    targets: Vec<bool>,
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn extend(&mut self, scores: &[f64], targets: &[bool]) {
        self.scores.extend_from_slice(scores);
        self.targets.extend_from_slice(targets);
    }

    /// Sort once by descending score and walk the order, reading off the
    /// running tp/fp at the end of each run of equal scores.
    fn counts(&self) -> ThresholdCounts {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        order.sort_unstable_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]));

        let mut thresholds = Vec::new();
        let mut tp_col = Vec::new();
        let mut fp_col = Vec::new();
        let mut tp = 0u64;
        let mut fp = 0u64;

        let mut i = 0;
        while i < order.len() {
            let current = self.scores[order[i]];
            // NaN only gets here with validation off; it must still form a run
            while i < order.len() && same_score(self.scores[order[i]], current) {
                if self.targets[order[i]] {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }
            thresholds.push(current);
            tp_col.push(tp);
            fp_col.push(fp);
        }

        thresholds.reverse();
        tp_col.reverse();
        fp_col.reverse();

        ThresholdCounts {
            thresholds,
            tp: tp_col,
            fp: fp_col,
            positives: tp,
            negatives: fp,
        }
    }
}

fn same_score(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Per-threshold counts over a fixed threshold set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinnedCounts {
    thresholds: ThresholdSet,
    tp: Vec<u64>,
    fp: Vec<u64>,
    positives: u64,
    negatives: u64,
}

impl BinnedCounts {
    pub fn new(thresholds: ThresholdSet) -> Self {
        let n = thresholds.len();
        Self {
            thresholds,
            tp: vec![0; n],
            fp: vec![0; n],
            positives: 0,
            negatives: 0,
        }
    }

    /// Each sample clears a prefix of the ascending thresholds. Histogram the
    /// prefix lengths, then a suffix sum turns the histogram into the count
    /// of samples clearing each threshold.
    fn update(&mut self, scores: &[f64], targets: &[bool]) {
        let n = self.thresholds.len();
        let mut pos_hits = vec![0u64; n + 1];
        let mut neg_hits = vec![0u64; n + 1];

        for (&score, &positive) in scores.iter().zip(targets) {
            let k = self.thresholds.cleared_by(score);
            if positive {
                pos_hits[k] += 1;
                self.positives += 1;
            } else {
                neg_hits[k] += 1;
                self.negatives += 1;
            }
        }

        let mut run_tp = 0u64;
        let mut run_fp = 0u64;
        for i in (0..n).rev() {
            run_tp += pos_hits[i + 1];
            run_fp += neg_hits[i + 1];
            self.tp[i] += run_tp;
            self.fp[i] += run_fp;
        }
    }

    fn counts(&self) -> ThresholdCounts {
        ThresholdCounts {
            thresholds: self.thresholds.as_slice().to_vec(),
            tp: self.tp.clone(),
            fp: self.fp.clone(),
            positives: self.positives,
            negatives: self.negatives,
        }
    }
}

/// Running confusion state for one binary sub-problem.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfusionState {
    /// Exact mode: samples are buffered until finalize.
    Exact(SampleBuffer),
    /// Grid or explicit mode: counts are kept per threshold.
    Binned(BinnedCounts),
}

impl ConfusionState {
    /// An empty state for the given threshold mode.
    pub fn new(mode: &ThresholdMode) -> Self {
        match mode {
            ThresholdMode::Exact => Self::Exact(SampleBuffer::default()),
            ThresholdMode::Binned(set) => Self::Binned(BinnedCounts::new(set.clone())),
        }
    }

    /// Whether this state was built for `mode`.
    pub fn matches_mode(&self, mode: &ThresholdMode) -> bool {
        match (self, mode) {
            (Self::Exact(_), ThresholdMode::Exact) => true,
            (Self::Binned(counts), ThresholdMode::Binned(set)) => counts.thresholds == *set,
            _ => false,
        }
    }

    /// Number of samples folded in so far.
    pub fn num_samples(&self) -> u64 {
        match self {
            Self::Exact(buffer) => buffer.len() as u64,
            Self::Binned(counts) => counts.positives + counts.negatives,
        }
    }

    /// Number of actual positives folded in so far.
    pub fn positives(&self) -> u64 {
        match self {
            Self::Exact(buffer) => buffer.targets.iter().filter(|&&t| t).count() as u64,
            Self::Binned(counts) => counts.positives,
        }
    }

    /// Fold in a batch that has already been filtered and binarized.
    ///
    /// `scores` and `targets` must have equal length; the public entry
    /// points check this before calling.
    pub(crate) fn update(&mut self, scores: &[f64], targets: &[bool]) {
        debug_assert_eq!(scores.len(), targets.len());
        log::trace!("confusion update with {} samples", scores.len());
        match self {
            Self::Exact(buffer) => buffer.extend(scores, targets),
            Self::Binned(counts) => counts.update(scores, targets),
        }
    }

    /// Resolve the state into its per-threshold table.
    pub fn counts(&self) -> ThresholdCounts {
        match self {
            Self::Exact(buffer) => buffer.counts(),
            Self::Binned(counts) => counts.counts(),
        }
    }
}

impl Mergeable for ConfusionState {
    fn merge(&mut self, other: Self) -> Result<()> {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => {
                log::debug!("merging exact states: {} + {} samples", a.len(), b.len());
                a.scores.extend(b.scores);
                a.targets.extend(b.targets);
                Ok(())
            }
            (Self::Binned(a), Self::Binned(b)) => {
                if a.thresholds != b.thresholds {
                    return Err(PrCurveError::IncompatibleState(format!(
                        "threshold sets differ ({} vs {} thresholds)",
                        a.thresholds.len(),
                        b.thresholds.len()
                    )));
                }
                log::debug!("merging binned states over {} thresholds", a.thresholds.len());
                for (x, y) in a.tp.iter_mut().zip(&b.tp) {
                    *x += y;
                }
                for (x, y) in a.fp.iter_mut().zip(&b.fp) {
                    *x += y;
                }
                a.positives += b.positives;
                a.negatives += b.negatives;
                Ok(())
            }
            _ => Err(PrCurveError::IncompatibleState(
                "cannot merge an exact-threshold state with a binned one".into(),
            )),
        }
    }
}

/// Combine two states built from disjoint samples.
///
/// # Errors
///
/// Returns [`PrCurveError::IncompatibleState`] when the states use different
/// threshold modes or different threshold sets.
pub fn merge_states(a: ConfusionState, b: ConfusionState) -> Result<ConfusionState> {
    a.merged(b)
}

// ---------------------------------------------------------------------------
// Validation and the functional entry point
// ---------------------------------------------------------------------------

/// Drop ignored samples and map binary labels to booleans.
///
/// With `validate` set, every score must be finite and every kept label must
/// be `0` or `1`. Without it, a label counts as positive iff it equals `1`.
pub(crate) fn filter_binary(
    scores: &[f64],
    labels: &[i64],
    ignore_label: Option<i64>,
    validate: bool,
) -> Result<(Vec<f64>, Vec<bool>)> {
    let mut kept_scores = Vec::with_capacity(scores.len());
    let mut kept_targets = Vec::with_capacity(labels.len());

    for (&score, &label) in scores.iter().zip(labels) {
        if ignore_label == Some(label) {
            continue;
        }
        if validate {
            if !score.is_finite() {
                return Err(PrCurveError::InvalidScoreValue(format!(
                    "score {} is not finite",
                    score
                )));
            }
            if label != 0 && label != 1 {
                return Err(PrCurveError::InvalidLabelValue(format!(
                    "binary labels must be 0 or 1{}, got {}",
                    ignore_hint(ignore_label),
                    label
                )));
            }
        }
        kept_scores.push(score);
        kept_targets.push(label == 1);
    }

    Ok((kept_scores, kept_targets))
}

pub(crate) fn ignore_hint(ignore_label: Option<i64>) -> String {
    match ignore_label {
        Some(ignore) => format!(" (or the ignore label {})", ignore),
        None => String::new(),
    }
}

/// Fold one batch of binary scores and labels into a running state.
///
/// `state` of `None` starts a fresh state for `thresholds`. Scores are used
/// as given; squashing raw logits is the dispatcher's job.
///
/// # Errors
///
/// - [`PrCurveError::ShapeMismatch`] if the slices differ in length
/// - [`PrCurveError::EmptyInput`] if the batch is empty, or every sample
///   carries `ignore_label`
/// - [`PrCurveError::InvalidLabelValue`] for a kept label other than 0/1
/// - [`PrCurveError::InvalidScoreValue`] for a NaN or infinite score
/// - [`PrCurveError::IncompatibleState`] if `state` was built for another
///   threshold mode
///
/// On error the incoming state is dropped unchanged; nothing is partially
/// applied.
pub fn accumulate(
    scores: &[f64],
    labels: &[i64],
    thresholds: &ThresholdMode,
    ignore_label: Option<i64>,
    state: Option<ConfusionState>,
) -> Result<ConfusionState> {
    if scores.len() != labels.len() {
        return Err(PrCurveError::ShapeMismatch(format!(
            "scores length {} != labels length {}",
            scores.len(),
            labels.len()
        )));
    }
    if scores.is_empty() {
        return Err(PrCurveError::EmptyInput("no samples".into()));
    }
    if let Some(state) = &state {
        if !state.matches_mode(thresholds) {
            return Err(PrCurveError::IncompatibleState(
                "running state was built for different thresholds".into(),
            ));
        }
    }

    let (kept_scores, kept_targets) = filter_binary(scores, labels, ignore_label, true)?;
    if kept_scores.is_empty() {
        return Err(PrCurveError::EmptyInput(
            "every sample carries the ignore label".into(),
        ));
    }

    let mut state = state.unwrap_or_else(|| ConfusionState::new(thresholds));
    state.update(&kept_scores, &kept_targets);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::{resolve_thresholds, ThresholdSpec};

    fn grid(n: usize) -> ThresholdMode {
        resolve_thresholds(&ThresholdSpec::Grid(n)).unwrap()
    }

    #[test]
    fn exact_counts_known_scenario() {
        let state = accumulate(
            &[0.1, 0.4, 0.35, 0.8],
            &[0, 0, 1, 1],
            &ThresholdMode::Exact,
            None,
            None,
        )
        .unwrap();
        let counts = state.counts();
        assert_eq!(counts.thresholds, vec![0.1, 0.35, 0.4, 0.8]);
        assert_eq!(counts.tp, vec![2, 2, 1, 1]);
        assert_eq!(counts.fp, vec![2, 1, 1, 0]);
        assert_eq!(counts.positives, 2);
        assert_eq!(counts.negatives, 2);
        assert_eq!(counts.false_negatives(), vec![0, 0, 1, 1]);
        assert_eq!(counts.predicted_positives(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn exact_counts_group_ties() {
        let state = accumulate(
            &[0.5, 0.5, 0.5, 0.2],
            &[1, 0, 1, 0],
            &ThresholdMode::Exact,
            None,
            None,
        )
        .unwrap();
        let counts = state.counts();
        assert_eq!(counts.thresholds, vec![0.2, 0.5]);
        assert_eq!(counts.tp, vec![2, 2]);
        assert_eq!(counts.fp, vec![2, 1]);
    }

    #[test]
    fn exact_walk_terminates_on_nan() {
        let mut state = ConfusionState::new(&ThresholdMode::Exact);
        state.update(&[f64::NAN, 0.3, f64::NAN], &[true, false, false]);
        let counts = state.counts();
        assert_eq!(counts.thresholds.len(), 2);
        assert_eq!(counts.thresholds[0], 0.3);
        assert!(counts.thresholds[1].is_nan());
        assert_eq!(counts.tp, vec![1, 1]);
        assert_eq!(counts.fp, vec![2, 1]);
    }

    #[test]
    fn binned_counts_use_greater_or_equal() {
        // 0.5 sits exactly on a grid point and must count at that threshold
        let state = accumulate(&[0.5, 0.2, 0.9], &[1, 0, 1], &grid(3), None, None).unwrap();
        let counts = state.counts();
        assert_eq!(counts.thresholds, vec![0.0, 0.5, 1.0]);
        assert_eq!(counts.tp, vec![2, 2, 0]);
        assert_eq!(counts.fp, vec![1, 0, 0]);
    }

    #[test]
    fn binned_below_every_threshold() {
        let mode = ThresholdMode::Binned(ThresholdSet::from_values(vec![0.3, 0.6]).unwrap());
        let state = accumulate(&[0.1, 0.2], &[1, 0], &mode, None, None).unwrap();
        let counts = state.counts();
        assert_eq!(counts.tp, vec![0, 0]);
        assert_eq!(counts.fp, vec![0, 0]);
        assert_eq!(counts.positives, 1);
        assert_eq!(counts.negatives, 1);
    }

    #[test]
    fn accumulate_threads_state() {
        let mode = grid(5);
        let state = accumulate(&[0.1, 0.9], &[0, 1], &mode, None, None).unwrap();
        let state = accumulate(&[0.6], &[1], &mode, None, Some(state)).unwrap();
        assert_eq!(state.num_samples(), 3);
        assert_eq!(state.positives(), 2);
    }

    #[test]
    fn ignored_samples_excluded_before_counting() {
        let state = accumulate(
            &[0.1, 0.9, 0.7],
            &[0, -1, 1],
            &ThresholdMode::Exact,
            Some(-1),
            None,
        )
        .unwrap();
        let counts = state.counts();
        assert_eq!(counts.thresholds, vec![0.1, 0.7]);
        assert_eq!(counts.positives, 1);
    }

    #[test]
    fn ignore_label_may_shadow_a_class() {
        let state = accumulate(&[0.1, 0.9, 0.7], &[0, 1, 0], &ThresholdMode::Exact, Some(0), None)
            .unwrap();
        assert_eq!(state.num_samples(), 1);
        assert_eq!(state.positives(), 1);
    }

    #[test]
    fn all_ignored_is_empty_input() {
        let err = accumulate(&[0.2, 0.3], &[-1, -1], &ThresholdMode::Exact, Some(-1), None)
            .unwrap_err();
        assert!(matches!(err, PrCurveError::EmptyInput(_)));
    }

    #[test]
    fn empty_batch_is_empty_input() {
        let err = accumulate(&[], &[], &ThresholdMode::Exact, None, None).unwrap_err();
        assert!(matches!(err, PrCurveError::EmptyInput(_)));
    }

    #[test]
    fn length_mismatch() {
        let err = accumulate(&[0.2, 0.3], &[1], &ThresholdMode::Exact, None, None).unwrap_err();
        assert!(matches!(err, PrCurveError::ShapeMismatch(_)));
    }

    #[test]
    fn non_binary_label_rejected() {
        let err = accumulate(&[0.2, 0.3], &[1, 2], &ThresholdMode::Exact, None, None).unwrap_err();
        assert!(matches!(err, PrCurveError::InvalidLabelValue(_)));
    }

    #[test]
    fn nan_score_rejected() {
        let err =
            accumulate(&[f64::NAN, 0.3], &[1, 0], &ThresholdMode::Exact, None, None).unwrap_err();
        assert!(matches!(err, PrCurveError::InvalidScoreValue(_)));
    }

    #[test]
    fn state_mode_mismatch_rejected() {
        let exact = accumulate(&[0.2], &[1], &ThresholdMode::Exact, None, None).unwrap();
        let err = accumulate(&[0.2], &[1], &grid(4), None, Some(exact)).unwrap_err();
        assert!(matches!(err, PrCurveError::IncompatibleState(_)));
    }

    #[test]
    fn merge_binned_adds_counts() {
        let mode = grid(4);
        let a = accumulate(&[0.1, 0.8], &[0, 1], &mode, None, None).unwrap();
        let b = accumulate(&[0.5, 0.9], &[1, 0], &mode, None, None).unwrap();
        let full = accumulate(&[0.1, 0.8, 0.5, 0.9], &[0, 1, 1, 0], &mode, None, None).unwrap();
        assert_eq!(merge_states(a, b).unwrap().counts(), full.counts());
    }

    #[test]
    fn merge_exact_concatenates() {
        let a = accumulate(&[0.1, 0.8], &[0, 1], &ThresholdMode::Exact, None, None).unwrap();
        let b = accumulate(&[0.5], &[1], &ThresholdMode::Exact, None, None).unwrap();
        let merged = merge_states(b, a).unwrap();
        assert_eq!(merged.num_samples(), 3);
        assert_eq!(merged.counts().thresholds, vec![0.1, 0.5, 0.8]);
    }

    #[test]
    fn merge_rejects_different_grids() {
        let a = accumulate(&[0.1], &[0], &grid(4), None, None).unwrap();
        let b = accumulate(&[0.1], &[0], &grid(5), None, None).unwrap();
        assert!(matches!(merge_states(a, b), Err(PrCurveError::IncompatibleState(_))));
    }

    #[test]
    fn merge_rejects_mixed_modes() {
        let a = accumulate(&[0.1], &[0], &grid(4), None, None).unwrap();
        let b = accumulate(&[0.1], &[0], &ThresholdMode::Exact, None, None).unwrap();
        assert!(merge_states(a, b).is_err());
    }

    #[test]
    fn failed_merge_leaves_state_untouched() {
        let mut a = accumulate(&[0.1, 0.7], &[0, 1], &grid(4), None, None).unwrap();
        let before = a.clone();
        let b = accumulate(&[0.1], &[0], &grid(6), None, None).unwrap();
        assert!(a.merge(b).is_err());
        assert_eq!(a, before);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::thresholds::{resolve_thresholds, ThresholdSpec};
    use proptest::prelude::*;

    fn samples() -> impl Strategy<Value = Vec<(f64, i64)>> {
        // coarse scores so ties are common
        proptest::collection::vec(((0u32..=20).prop_map(|k| k as f64 / 20.0), 0i64..=1), 1..60)
    }

    fn modes() -> impl Strategy<Value = ThresholdMode> {
        prop_oneof![
            Just(ThresholdMode::Exact),
            (2usize..40).prop_map(|n| resolve_thresholds(&ThresholdSpec::Grid(n)).unwrap()),
        ]
    }

    fn split(data: &[(f64, i64)]) -> (Vec<f64>, Vec<i64>) {
        data.iter().copied().unzip()
    }

    proptest! {
        #[test]
        fn counts_are_monotone(data in samples(), mode in modes()) {
            let (scores, labels) = split(&data);
            let counts = accumulate(&scores, &labels, &mode, None, None).unwrap().counts();
            prop_assert!(counts.tp.windows(2).all(|w| w[0] >= w[1]));
            prop_assert!(counts.fp.windows(2).all(|w| w[0] >= w[1]));
            prop_assert!(counts.thresholds.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn sharding_does_not_change_counts(
            data in samples(),
            mode in modes(),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..4),
        ) {
            let (scores, labels) = split(&data);
            let full = accumulate(&scores, &labels, &mode, None, None).unwrap();

            let mut bounds: Vec<usize> = cuts.iter().map(|c| c.index(data.len())).collect();
            bounds.push(0);
            bounds.push(data.len());
            bounds.sort_unstable();
            bounds.dedup();

            let shards: Vec<ConfusionState> = bounds
                .windows(2)
                .map(|w| accumulate(&scores[w[0]..w[1]], &labels[w[0]..w[1]], &mode, None, None).unwrap())
                .collect();

            // fold in reverse order to exercise commutativity as well
            let mut merged = ConfusionState::new(&mode);
            for shard in shards.into_iter().rev() {
                merged.merge(shard).unwrap();
            }
            prop_assert_eq!(merged.counts(), full.counts());
        }
    }
}
