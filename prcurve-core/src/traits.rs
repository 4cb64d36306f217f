//! Core trait definitions shared across the prcurve crates.

/// A running state that can absorb another state built from a disjoint set
/// of samples.
///
/// Implementations must be associative and commutative: the merged result
/// cannot depend on how the samples were sharded or in which order the
/// shards are folded together.
pub trait Mergeable: Sized {
    /// Fold `other` into `self`.
    ///
    /// # Errors
    ///
    /// Returns [`PrCurveError::IncompatibleState`](crate::PrCurveError::IncompatibleState)
    /// when the two states were configured differently. `self` is left
    /// untouched in that case.
    fn merge(&mut self, other: Self) -> crate::Result<()>;

    /// By-value variant of [`merge`](Mergeable::merge).
    fn merged(mut self, other: Self) -> crate::Result<Self> {
        self.merge(other)?;
        Ok(self)
    }
}

/// A type that can produce a summary of its contents.
pub trait Summarizable {
    /// A one-line summary suitable for display.
    fn summary(&self) -> String;
}
