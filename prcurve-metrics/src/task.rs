//! Binary, multiclass and multilabel dispatch.
//!
//! Every task is reduced to one or more binary sub-problems (one per class
//! or label), each of which runs through the shared accumulator and
//! finalizer. Inputs are flat row-major buffers:
//!
//! | task | `scores` | `labels` |
//! |---|---|---|
//! | [`Task::Binary`] | `n` | `n` |
//! | [`Task::Multiclass`] | `n × num_classes` | `n` class indices |
//! | [`Task::Multilabel`] | `n × num_labels` | `n × num_labels` indicators |
//!
//! Batches with extra trailing dimensions (`n × C × ...`) are brought into
//! this layout with [`move_class_axis_last`].

use prcurve_core::prob::{squash_binary, squash_multiclass};
use prcurve_core::{PrCurveError, Result};

use crate::confusion::{filter_binary, ignore_hint, ConfusionState};
use crate::curve::PrCurve;
use crate::thresholds::{resolve_thresholds, ThresholdSpec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The classification task a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Task {
    /// One score and one 0/1 label per sample.
    Binary,
    /// A row of per-class scores and one class index per sample.
    Multiclass { num_classes: usize },
    /// A row of per-label scores and a row of 0/1 indicators per sample.
    Multilabel { num_labels: usize },
}

impl Task {
    /// Number of curves this task produces.
    pub fn num_curves(&self) -> usize {
        match *self {
            Self::Binary => 1,
            Self::Multiclass { num_classes } => num_classes,
            Self::Multilabel { num_labels } => num_labels,
        }
    }

    /// Check the task's own parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PrCurveError::ShapeMismatch`] for fewer than two classes or
    /// zero labels.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Binary => Ok(()),
            Self::Multiclass { num_classes } if num_classes < 2 => {
                Err(PrCurveError::ShapeMismatch(format!(
                    "multiclass needs at least 2 classes, got {}",
                    num_classes
                )))
            }
            Self::Multilabel { num_labels: 0 } => Err(PrCurveError::ShapeMismatch(
                "multilabel needs at least 1 label".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Result of [`compute_curve`]: a single curve for binary tasks, one curve
/// per class (class index ascending) otherwise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CurveOutput {
    Single(PrCurve),
    PerClass(Vec<PrCurve>),
}

impl CurveOutput {
    /// The binary curve, or `None` for a per-class collection.
    pub fn into_single(self) -> Option<PrCurve> {
        match self {
            Self::Single(curve) => Some(curve),
            Self::PerClass(_) => None,
        }
    }

    /// All curves in class order; a binary result becomes a one-element vec.
    pub fn into_curves(self) -> Vec<PrCurve> {
        match self {
            Self::Single(curve) => vec![curve],
            Self::PerClass(curves) => curves,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::PerClass(curves) => curves.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Batch preparation
// ---------------------------------------------------------------------------

/// One binary sub-problem after filtering and squashing.
#[derive(Debug, Clone, Default)]
pub(crate) struct BinaryProblem {
    pub scores: Vec<f64>,
    pub targets: Vec<bool>,
}

/// Validate a batch for `task` and split it into one binary sub-problem per
/// curve.
///
/// All checks run before anything is returned, so callers can apply the
/// result to running state without risk of a partial update.
pub(crate) fn split_batch(
    task: Task,
    scores: &[f64],
    labels: &[i64],
    ignore_label: Option<i64>,
    validate: bool,
) -> Result<Vec<BinaryProblem>> {
    task.validate()?;
    log::debug!(
        "dispatching {:?} batch: {} scores, {} labels",
        task,
        scores.len(),
        labels.len()
    );
    match task {
        Task::Binary => split_binary(scores, labels, ignore_label, validate).map(|p| vec![p]),
        Task::Multiclass { num_classes } => {
            split_multiclass(scores, labels, num_classes, ignore_label, validate)
        }
        Task::Multilabel { num_labels } => {
            split_multilabel(scores, labels, num_labels, ignore_label, validate)
        }
    }
}

fn split_binary(
    scores: &[f64],
    labels: &[i64],
    ignore_label: Option<i64>,
    validate: bool,
) -> Result<BinaryProblem> {
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

    let (mut kept_scores, targets) = filter_binary(scores, labels, ignore_label, validate)?;
    if kept_scores.is_empty() {
        return Err(PrCurveError::EmptyInput(
            "every sample carries the ignore label".into(),
        ));
    }
    if squash_binary(&mut kept_scores) {
        log::trace!("applied logistic transform to {} scores", kept_scores.len());
    }
    Ok(BinaryProblem {
        scores: kept_scores,
        targets,
    })
}

fn split_multiclass(
    scores: &[f64],
    labels: &[i64],
    num_classes: usize,
    ignore_label: Option<i64>,
    validate: bool,
) -> Result<Vec<BinaryProblem>> {
    let expected = labels.len().checked_mul(num_classes).ok_or_else(|| {
        PrCurveError::ShapeMismatch(format!(
            "{} samples × {} classes overflows the score buffer size",
            labels.len(),
            num_classes
        ))
    })?;
    if scores.len() != expected {
        return Err(PrCurveError::ShapeMismatch(format!(
            "expected {} scores for {} samples × {} classes, got {}",
            expected,
            labels.len(),
            num_classes,
            scores.len()
        )));
    }
    if labels.is_empty() {
        return Err(PrCurveError::EmptyInput("no samples".into()));
    }

    let mut kept_rows = Vec::with_capacity(scores.len());
    let mut kept_labels = Vec::with_capacity(labels.len());
    for (row, &label) in scores.chunks_exact(num_classes).zip(labels) {
        if ignore_label == Some(label) {
            continue;
        }
        if validate {
            if label < 0 || label as u64 >= num_classes as u64 {
                return Err(PrCurveError::InvalidLabelValue(format!(
                    "class index must be in [0, {}){}, got {}",
                    num_classes,
                    ignore_hint(ignore_label),
                    label
                )));
            }
            if let Some(bad) = row.iter().find(|s| !s.is_finite()) {
                return Err(PrCurveError::InvalidScoreValue(format!(
                    "score {} is not finite",
                    bad
                )));
            }
        }
        kept_rows.extend_from_slice(row);
        kept_labels.push(label);
    }
    if kept_labels.is_empty() {
        return Err(PrCurveError::EmptyInput(
            "every sample carries the ignore label".into(),
        ));
    }
    if squash_multiclass(&mut kept_rows, num_classes)? {
        log::trace!("applied softmax to {} rows", kept_labels.len());
    }

    let problems = (0..num_classes)
        .map(|class| BinaryProblem {
            scores: kept_rows
                .iter()
                .skip(class)
                .step_by(num_classes)
                .copied()
                .collect(),
            targets: kept_labels.iter().map(|&l| l == class as i64).collect(),
        })
        .collect();
    Ok(problems)
}

fn split_multilabel(
    scores: &[f64],
    labels: &[i64],
    num_labels: usize,
    ignore_label: Option<i64>,
    validate: bool,
) -> Result<Vec<BinaryProblem>> {
    if scores.len() != labels.len() {
        return Err(PrCurveError::ShapeMismatch(format!(
            "scores length {} != labels length {}",
            scores.len(),
            labels.len()
        )));
    }
    if scores.len() % num_labels != 0 {
        return Err(PrCurveError::ShapeMismatch(format!(
            "{} entries cannot be split into rows of {} labels",
            scores.len(),
            num_labels
        )));
    }
    if scores.is_empty() {
        return Err(PrCurveError::EmptyInput("no samples".into()));
    }
    if validate {
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(PrCurveError::InvalidScoreValue(format!(
                "score {} is not finite",
                bad
            )));
        }
        if let Some(bad) = labels
            .iter()
            .find(|&&l| l != 0 && l != 1 && ignore_label != Some(l))
        {
            return Err(PrCurveError::InvalidLabelValue(format!(
                "multilabel indicators must be 0 or 1{}, got {}",
                ignore_hint(ignore_label),
                bad
            )));
        }
    }
    if labels.iter().all(|&l| ignore_label == Some(l)) {
        return Err(PrCurveError::EmptyInput(
            "every entry carries the ignore label".into(),
        ));
    }

    let mut problems = vec![BinaryProblem::default(); num_labels];
    for (row_scores, row_labels) in scores
        .chunks_exact(num_labels)
        .zip(labels.chunks_exact(num_labels))
    {
        for (problem, (&score, &label)) in problems.iter_mut().zip(row_scores.iter().zip(row_labels)) {
            if ignore_label == Some(label) {
                continue;
            }
            problem.scores.push(score);
            problem.targets.push(label == 1);
        }
    }
    // each column decides on the logistic transform over its kept entries
    for (column, problem) in problems.iter_mut().enumerate() {
        if squash_binary(&mut problem.scores) {
            log::trace!(
                "applied logistic transform to {} scores of label {}",
                problem.scores.len(),
                column
            );
        }
    }
    Ok(problems)
}

/// Reorder a `n × num_classes × extra` buffer into `(n · extra) × num_classes`
/// rows.
///
/// Inputs with trailing dimensions after the class axis (for example
/// per-pixel scores) flatten those dimensions into `extra`; every position
/// then becomes a sample of its own. Multiclass labels shaped `n × extra`
/// are already in that sample order. Multilabel indicators shaped like their
/// scores go through this function too.
///
/// # Errors
///
/// Returns [`PrCurveError::ShapeMismatch`] if `num_classes` or `extra` is
/// zero, or `values.len()` is not a multiple of `num_classes × extra`.
pub fn move_class_axis_last<T: Copy>(
    values: &[T],
    num_classes: usize,
    extra: usize,
) -> Result<Vec<T>> {
    let block = num_classes
        .checked_mul(extra)
        .filter(|&b| b > 0)
        .ok_or_else(|| {
            PrCurveError::ShapeMismatch(format!(
                "cannot lay out {} classes × {} positions",
                num_classes, extra
            ))
        })?;
    if values.len() % block != 0 {
        return Err(PrCurveError::ShapeMismatch(format!(
            "{} values cannot be split into samples of {} classes × {} positions",
            values.len(),
            num_classes,
            extra
        )));
    }

    let mut rows = Vec::with_capacity(values.len());
    for sample in values.chunks_exact(block) {
        for pos in 0..extra {
            rows.extend((0..num_classes).map(|class| sample[class * extra + pos]));
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Finalize fan-out
// ---------------------------------------------------------------------------

/// Finalize every per-class state, in class order.
pub(crate) fn finalize_all(states: &[ConfusionState]) -> Vec<PrCurve> {
    #[cfg(feature = "parallel")]
    let curves = {
        use rayon::prelude::*;
        states.par_iter().map(ConfusionState::finalize).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let curves = states.iter().map(ConfusionState::finalize).collect();
    curves
}

// ---------------------------------------------------------------------------
// Functional entry points
// ---------------------------------------------------------------------------

/// Compute the precision-recall curve(s) for one batch end to end.
///
/// Binary tasks yield [`CurveOutput::Single`]; multiclass and multilabel
/// tasks yield [`CurveOutput::PerClass`] with one curve per class.
///
/// # Errors
///
/// - [`PrCurveError::InvalidThresholdSpec`] for a malformed `thresholds`
/// - [`PrCurveError::ShapeMismatch`] if scores and labels disagree in size
/// - [`PrCurveError::InvalidLabelValue`] for a label outside the task range
/// - [`PrCurveError::InvalidScoreValue`] for a NaN or infinite score
/// - [`PrCurveError::EmptyInput`] for no samples, or only ignored ones
pub fn compute_curve(
    task: Task,
    scores: &[f64],
    labels: &[i64],
    thresholds: &ThresholdSpec,
    ignore_label: Option<i64>,
) -> Result<CurveOutput> {
    let mode = resolve_thresholds(thresholds)?;
    let problems = split_batch(task, scores, labels, ignore_label, true)?;

    let states: Vec<ConfusionState> = problems
        .iter()
        .map(|problem| {
            let mut state = ConfusionState::new(&mode);
            state.update(&problem.scores, &problem.targets);
            state
        })
        .collect();

    let mut curves = finalize_all(&states);
    Ok(match task {
        Task::Binary => CurveOutput::Single(curves.remove(0)),
        _ => CurveOutput::PerClass(curves),
    })
}

/// Binary precision-recall curve.
///
/// # Errors
///
/// See [`compute_curve`].
pub fn binary_precision_recall_curve(
    scores: &[f64],
    labels: &[i64],
    thresholds: &ThresholdSpec,
    ignore_label: Option<i64>,
) -> Result<PrCurve> {
    let curves = compute_curve(Task::Binary, scores, labels, thresholds, ignore_label)?;
    Ok(curves.into_curves().remove(0))
}

/// One-vs-rest precision-recall curves, one per class.
///
/// # Errors
///
/// See [`compute_curve`].
pub fn multiclass_precision_recall_curve(
    scores: &[f64],
    labels: &[i64],
    num_classes: usize,
    thresholds: &ThresholdSpec,
    ignore_label: Option<i64>,
) -> Result<Vec<PrCurve>> {
    compute_curve(
        Task::Multiclass { num_classes },
        scores,
        labels,
        thresholds,
        ignore_label,
    )
    .map(CurveOutput::into_curves)
}

/// Independent precision-recall curves, one per label column.
///
/// # Errors
///
/// See [`compute_curve`].
pub fn multilabel_precision_recall_curve(
    scores: &[f64],
    labels: &[i64],
    num_labels: usize,
    thresholds: &ThresholdSpec,
    ignore_label: Option<i64>,
) -> Result<Vec<PrCurve>> {
    compute_curve(
        Task::Multilabel { num_labels },
        scores,
        labels,
        thresholds,
        ignore_label,
    )
    .map(CurveOutput::into_curves)
}
