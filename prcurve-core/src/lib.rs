//! Shared primitives for the prcurve precision-recall crates.
//!
//! `prcurve-core` provides the foundation the metric crates build on:
//!
//! - **Error types** — [`PrCurveError`] and [`Result`] for structured error handling
//! - **Traits** — [`Mergeable`] for distributed state and [`Summarizable`]
//! - **Probability transforms** — numerically stable logistic and softmax,
//!   plus the checks that decide whether raw scores need them

pub mod error;
pub mod prob;
pub mod traits;

pub use error::{PrCurveError, Result};
pub use traits::*;
