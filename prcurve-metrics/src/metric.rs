//! Stateful precision-recall curve metrics.
//!
//! These wrap the functional pieces into objects that are fed batch by batch
//! with [`CurveMetric::update`], synchronized across workers with
//! [`Mergeable::merge`] and read out with [`CurveMetric::compute`].
//!
//! ```
//! use prcurve_metrics::metric::{BinaryPrecisionRecallCurve, CurveConfig, CurveMetric};
//! use prcurve_metrics::thresholds::ThresholdSpec;
//!
//! let config = CurveConfig {
//!     thresholds: ThresholdSpec::Grid(11),
//!     ..CurveConfig::default()
//! };
//! let mut metric = BinaryPrecisionRecallCurve::new(config).unwrap();
//! metric.update(&[0.1, 0.8], &[0, 1]).unwrap();
//! metric.update(&[0.4, 0.35], &[0, 1]).unwrap();
//! let curve = metric.compute().unwrap();
//! assert_eq!(curve.thresholds.len(), 11);
//! ```

use prcurve_core::{Mergeable, PrCurveError, Result};

use crate::confusion::ConfusionState;
use crate::curve::PrCurve;
use crate::task::{finalize_all, split_batch, Task};
use crate::thresholds::{resolve_thresholds, ThresholdMode, ThresholdSpec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration shared by all curve metrics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurveConfig {
    /// How thresholds are chosen.
    pub thresholds: ThresholdSpec,
    /// Label value marking samples (or multilabel entries) to skip.
    pub ignore_index: Option<i64>,
    /// Check label ranges and score finiteness on every update. Shape checks
    /// always run.
    pub validate_args: bool,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdSpec::Exact,
            ignore_index: None,
            validate_args: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A metric accumulated over batches and computed once at the end.
pub trait CurveMetric: Mergeable {
    /// What [`compute`](CurveMetric::compute) returns.
    type Output;

    /// Fold one batch into the running state.
    ///
    /// On error the running state is unchanged.
    fn update(&mut self, scores: &[f64], labels: &[i64]) -> Result<()>;

    /// Finalize the running state into curves. Does not consume the state.
    fn compute(&self) -> Result<Self::Output>;

    /// Drop all accumulated state.
    fn reset(&mut self);

    /// The metric's name.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Shared accumulator
// ---------------------------------------------------------------------------

/// One confusion state per curve plus the settings that shaped them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct ClassStates {
    task: Task,
    config: CurveConfig,
    mode: ThresholdMode,
    states: Vec<ConfusionState>,
    updates: usize,
}

impl ClassStates {
    fn new(task: Task, config: CurveConfig) -> Result<Self> {
        task.validate()?;
        let mode = resolve_thresholds(&config.thresholds)?;
        let states = Self::fresh(task, &mode);
        Ok(Self {
            task,
            config,
            mode,
            states,
            updates: 0,
        })
    }

    fn fresh(task: Task, mode: &ThresholdMode) -> Vec<ConfusionState> {
        (0..task.num_curves())
            .map(|_| ConfusionState::new(mode))
            .collect()
    }

    fn update(&mut self, scores: &[f64], labels: &[i64]) -> Result<()> {
        let problems = split_batch(
            self.task,
            scores,
            labels,
            self.config.ignore_index,
            self.config.validate_args,
        )?;
        for (state, problem) in self.states.iter_mut().zip(&problems) {
            state.update(&problem.scores, &problem.targets);
        }
        self.updates += 1;
        Ok(())
    }

    fn compute(&self) -> Result<Vec<PrCurve>> {
        if self.states.iter().all(|s| s.num_samples() == 0) {
            return Err(PrCurveError::EmptyInput(
                "no samples have been accumulated".into(),
            ));
        }
        Ok(finalize_all(&self.states))
    }

    fn reset(&mut self) {
        self.states = Self::fresh(self.task, &self.mode);
        self.updates = 0;
    }

    fn merge(&mut self, other: Self) -> Result<()> {
        if self.task != other.task {
            return Err(PrCurveError::IncompatibleState(format!(
                "cannot merge {:?} with {:?}",
                self.task, other.task
            )));
        }
        if self.mode != other.mode {
            return Err(PrCurveError::IncompatibleState(
                "metrics use different thresholds".into(),
            ));
        }
        if self.config.ignore_index != other.config.ignore_index {
            return Err(PrCurveError::IncompatibleState(format!(
                "metrics ignore different labels ({:?} vs {:?})",
                self.config.ignore_index, other.config.ignore_index
            )));
        }
        log::debug!(
            "merging {:?} metric states ({} + {} updates)",
            self.task,
            self.updates,
            other.updates
        );
        // modes already match, so no per-class merge below can fail halfway
        for (state, incoming) in self.states.iter_mut().zip(other.states) {
            state.merge(incoming)?;
        }
        self.updates += other.updates;
        Ok(())
    }
}

macro_rules! curve_metric {
    (
        $(#[$meta:meta])*
        $name:ident, $output:ty, |$curves:ident| $finish:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name {
            inner: ClassStates,
        }

        impl $name {
            /// The configuration this metric was built with.
            pub fn config(&self) -> &CurveConfig {
                &self.inner.config
            }

            /// Number of successful updates folded in, including those of
            /// merged workers.
            pub fn update_count(&self) -> usize {
                self.inner.updates
            }

            /// Per-curve running states, in class order.
            pub fn states(&self) -> &[ConfusionState] {
                &self.inner.states
            }
        }

        impl CurveMetric for $name {
            type Output = $output;

            fn update(&mut self, scores: &[f64], labels: &[i64]) -> Result<()> {
                self.inner.update(scores, labels)
            }

            fn compute(&self) -> Result<Self::Output> {
                self.inner.compute().and_then(|$curves| $finish)
            }

            fn reset(&mut self) {
                self.inner.reset();
            }

            fn name(&self) -> &str {
                stringify!($name)
            }
        }

        impl Mergeable for $name {
            fn merge(&mut self, other: Self) -> Result<()> {
                self.inner.merge(other.inner)
            }
        }
    };
}

curve_metric!(
    /// Precision-recall curve for binary scores and 0/1 labels.
    BinaryPrecisionRecallCurve,
    PrCurve,
    |curves| curves
        .into_iter()
        .next()
        .ok_or_else(|| PrCurveError::EmptyInput("binary metric holds no curve".into()))
);

curve_metric!(
    /// One-vs-rest precision-recall curves over `num_classes` classes.
    MulticlassPrecisionRecallCurve,
    Vec<PrCurve>,
    |curves| Ok(curves)
);

curve_metric!(
    /// Independent precision-recall curves over `num_labels` label columns.
    MultilabelPrecisionRecallCurve,
    Vec<PrCurve>,
    |curves| Ok(curves)
);

impl BinaryPrecisionRecallCurve {
    /// # Errors
    ///
    /// Returns an error if `config.thresholds` is malformed.
    pub fn new(config: CurveConfig) -> Result<Self> {
        Ok(Self {
            inner: ClassStates::new(Task::Binary, config)?,
        })
    }
}

impl MulticlassPrecisionRecallCurve {
    /// # Errors
    ///
    /// Returns an error if `num_classes < 2` or `config.thresholds` is
    /// malformed.
    pub fn new(num_classes: usize, config: CurveConfig) -> Result<Self> {
        Ok(Self {
            inner: ClassStates::new(Task::Multiclass { num_classes }, config)?,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.inner.task.num_curves()
    }
}

impl MultilabelPrecisionRecallCurve {
    /// # Errors
    ///
    /// Returns an error if `num_labels == 0` or `config.thresholds` is
    /// malformed.
    pub fn new(num_labels: usize, config: CurveConfig) -> Result<Self> {
        Ok(Self {
            inner: ClassStates::new(Task::Multilabel { num_labels }, config)?,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.inner.task.num_curves()
    }
}
