//! Category-scoped views of a vector index

/// Positions of the entries of a [`super::VectorIndex`] sharing one score category
///
/// A pure function of (index, category), so it can be memoized for as long as
/// the index it was derived from is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedIndex {
    category: String,
    positions: Vec<usize>,
}

impl ScopedIndex {
    #[must_use]
    pub const fn new(category: String, positions: Vec<usize>) -> Self {
        Self {
            category,
            positions,
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Entry positions in insertion order
    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
