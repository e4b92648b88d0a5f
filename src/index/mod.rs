//! In-memory vector index over defect records
//!
//! The index is built once from the knowledge base and never mutated. A
//! rebuild produces a fresh [`VectorIndex`] that callers swap in whole.

mod builder;
mod scoped;

use std::collections::BTreeMap;

pub use builder::BuildReport;
pub use scoped::ScopedIndex;

use crate::knowledge::DefectRecord;
use crate::{Error, Result};

/// A defect record paired with the embedding of its description
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub record: DefectRecord,
    pub vector: Vec<f32>,
}

/// Result of a nearest-neighbor lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the entry in the index
    pub position: usize,
    /// Squared L2 distance to the query
    pub distance: f32,
}

/// Flat L2 index holding every valid defect record
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<IndexedEntry>,
    dimension: usize,
}

impl VectorIndex {
    /// Assemble an index from pre-computed entries
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexBuild` if a vector is empty or dimensions disagree
    pub fn from_entries(entries: Vec<IndexedEntry>) -> Result<Self> {
        let dimension = entries.first().map_or(0, |e| e.vector.len());

        for entry in &entries {
            if entry.vector.is_empty() || entry.vector.len() != dimension {
                return Err(Error::IndexBuild(format!(
                    "record {} has a {}-dimension vector, expected {dimension}",
                    entry.record.id(),
                    entry.vector.len()
                )));
            }
        }

        Ok(Self { entries, dimension })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension (0 for an empty index)
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexedEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&IndexedEntry> {
        self.entries.get(position)
    }

    /// Find the `k` entries closest to `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::Search` if the query dimension does not match the index
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.nearest(0..self.entries.len(), query, k)
    }

    /// Find the `k` entries of a scoped subset closest to `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::Search` if the query dimension does not match or the
    /// scope refers to positions outside this index
    pub fn search_scoped(
        &self,
        scope: &ScopedIndex,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        if scope.positions().iter().any(|&p| p >= self.entries.len()) {
            return Err(Error::Search(format!(
                "scope '{}' does not belong to this index",
                scope.category()
            )));
        }
        self.nearest(scope.positions().iter().copied(), query, k)
    }

    /// Derive the subset of entries whose score category equals `category`
    #[must_use]
    pub fn scoped(&self, category: &str) -> ScopedIndex {
        let positions = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.record.category() == category)
            .map(|(i, _)| i)
            .collect();

        ScopedIndex::new(category.to_string(), positions)
    }

    /// Indexed entry count per score category
    #[must_use]
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.record.category().to_string()).or_insert(0) += 1;
        }
        counts
    }

    fn nearest(
        &self,
        positions: impl Iterator<Item = usize>,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(Error::Search(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimension
            )));
        }

        let mut neighbors: Vec<Neighbor> = positions
            .map(|position| Neighbor {
                position,
                distance: squared_l2(&self.entries[position].vector, query),
            })
            .collect();

        // Stable: equal distances keep insertion order
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);

        Ok(neighbors)
    }
}

/// Squared Euclidean distance
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
