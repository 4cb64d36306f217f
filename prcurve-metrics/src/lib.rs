//! Precision-recall curves for classification evaluation.
//!
//! - **Thresholds** — exact (every distinct score), evenly spaced grid, or an
//!   explicit sequence
//! - **Confusion accumulation** — per-threshold tp/fp counts built batch by
//!   batch and merged across workers
//! - **Curve finalization** — precision/recall per threshold, closed by the
//!   `(1, 0)` point
//! - **Task dispatch** — binary, multiclass (one-vs-rest) and multilabel,
//!   with trailing dimensions flattened by [`move_class_axis_last`]
//! - **Stateful metrics** — update/merge/compute objects over the above
//!
//! ```
//! use prcurve_metrics::{compute_curve, CurveOutput, Task, ThresholdSpec};
//!
//! let out = compute_curve(
//!     Task::Binary,
//!     &[0.1, 0.4, 0.35, 0.8],
//!     &[0, 0, 1, 1],
//!     &ThresholdSpec::Exact,
//!     None,
//! )
//! .unwrap();
//! let curve = out.into_single().unwrap();
//! assert_eq!(curve.thresholds, vec![0.1, 0.35, 0.4, 0.8]);
//! assert_eq!(curve.recall, vec![1.0, 1.0, 0.5, 0.5, 0.0]);
//! ```

pub mod confusion;
pub mod curve;
pub mod metric;
pub mod task;
pub mod thresholds;

pub use confusion::{accumulate, merge_states, ConfusionState, ThresholdCounts};
pub use curve::{finalize_curve, PrCurve};
pub use metric::{
    BinaryPrecisionRecallCurve, CurveConfig, CurveMetric, MulticlassPrecisionRecallCurve,
    MultilabelPrecisionRecallCurve,
};
pub use task::{
    binary_precision_recall_curve, compute_curve, multiclass_precision_recall_curve,
    move_class_axis_last, multilabel_precision_recall_curve, CurveOutput, Task,
};
pub use thresholds::{resolve_thresholds, ThresholdMode, ThresholdSet, ThresholdSpec};

pub use prcurve_core::{Mergeable, PrCurveError, Result};
