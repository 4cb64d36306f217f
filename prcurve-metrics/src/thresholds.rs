//! Decision thresholds.
//!
//! A sample is predicted positive at threshold `t` when `score >= t`. The
//! thresholds driving a curve come from one of three places:
//!
//! - **Exact** — every distinct score seen, resolved only once all scores
//!   are in. Memory grows with the number of samples.
//! - **Grid** — `n` evenly spaced values over `[0, 1]`, fixed up front, so
//!   per-threshold counts can be accumulated in `O(n)` memory.
//! - **Explicit** — a caller-supplied ascending sequence in `[0, 1]`.

use prcurve_core::{PrCurveError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the caller wants thresholds chosen.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ThresholdSpec {
    /// Use every distinct observed score.
    #[default]
    Exact,
    /// `n` values linearly spaced over `[0, 1]`, endpoints included.
    Grid(usize),
    /// Use these values as-is; must be strictly ascending within `[0, 1]`.
    Explicit(Vec<f64>),
}

impl From<usize> for ThresholdSpec {
    fn from(n: usize) -> Self {
        Self::Grid(n)
    }
}

impl From<Vec<f64>> for ThresholdSpec {
    fn from(values: Vec<f64>) -> Self {
        Self::Explicit(values)
    }
}

/// A strictly ascending, finite set of thresholds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdSet {
    values: Vec<f64>,
}

impl ThresholdSet {
    /// `n` evenly spaced values over `[0, 1]`.
    ///
    /// Value `i` is computed as `i / (n - 1)` so that `0.0` and `1.0` are hit
    /// exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if `n < 2`.
    pub fn linspace(n: usize) -> Result<Self> {
        if n < 2 {
            return Err(PrCurveError::InvalidThresholdSpec(format!(
                "grid size must be at least 2, got {}",
                n
            )));
        }
        let denom = (n - 1) as f64;
        let values = (0..n).map(|i| i as f64 / denom).collect();
        Ok(Self { values })
    }

    /// Validate a caller-supplied sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence is empty, contains a non-finite value
    /// or a value outside `[0, 1]`, or is not strictly ascending (which also
    /// rules out duplicates).
    pub fn from_values(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(PrCurveError::InvalidThresholdSpec(
                "explicit thresholds must not be empty".into(),
            ));
        }
        if let Some(bad) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(PrCurveError::InvalidThresholdSpec(format!(
                "threshold {} lies outside [0, 1]",
                bad
            )));
        }
        if let Some(w) = values.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PrCurveError::InvalidThresholdSpec(format!(
                "thresholds must be strictly ascending, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(Self { values })
    }

    /// The thresholds in ascending order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Number of thresholds.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no thresholds. Never true for a set built through
    /// [`ThresholdSet::linspace`] or [`ThresholdSet::from_values`].
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of thresholds a sample with `score` clears, i.e. the count of
    /// `t` with `t <= score`. Those are always a prefix of the set.
    #[inline]
    pub fn cleared_by(&self, score: f64) -> usize {
        self.values.partition_point(|&t| t <= score)
    }
}

/// A resolved [`ThresholdSpec`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ThresholdMode {
    /// Thresholds are the distinct observed scores, known only at finalize.
    Exact,
    /// Thresholds fixed up front.
    Binned(ThresholdSet),
}

/// Turn a caller specification into the threshold mode that drives the
/// accumulator.
///
/// # Errors
///
/// Returns [`PrCurveError::InvalidThresholdSpec`] for a grid smaller than 2
/// or a malformed explicit sequence.
pub fn resolve_thresholds(spec: &ThresholdSpec) -> Result<ThresholdMode> {
    match spec {
        ThresholdSpec::Exact => Ok(ThresholdMode::Exact),
        ThresholdSpec::Grid(n) => ThresholdSet::linspace(*n).map(ThresholdMode::Binned),
        ThresholdSpec::Explicit(values) => {
            ThresholdSet::from_values(values.clone()).map(ThresholdMode::Binned)
        }
    }
}
