//! Incremental collection deltas.
//!
//! A [`CollectionDelta`] describes how an ordered collection moved from its
//! previous state to the current one. Consumers apply it in three steps:
//!
//! 1. remove every range in `removed` (indices into the previous collection),
//! 2. overwrite the items covered by `changed_ranges` with `changed`
//!    (indices into the collection after step 1),
//! 3. append `added` at the tail.
//!
//! [`CollectionDelta::apply`] implements exactly that order.

use serde::{Deserialize, Serialize};

use crate::error::DeltaError;

/// Half-open index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    /// First index covered.
    pub start: usize,
    /// One past the last index covered.
    pub end: usize,
}

impl IndexRange {
    /// Construct a range covering `start..end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of indices covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range covers nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Collapse ascending indices into the minimal set of contiguous ranges.
    ///
    /// Duplicates are ignored. Indices must be sorted ascending; an index lower
    /// than its predecessor starts a new range.
    #[must_use]
    pub fn coalesce<I>(indices: I) -> Vec<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut ranges: Vec<Self> = Vec::new();
        for index in indices {
            match ranges.last_mut() {
                Some(last) if index == last.end => last.end += 1,
                Some(last) if (last.start..last.end).contains(&index) => {}
                _ => ranges.push(Self::new(index, index + 1)),
            }
        }
        ranges
    }
}

/// Check that ranges are well formed, ascending, non-overlapping and, when a
/// bound is given, within it.
fn validate_ranges(ranges: &[IndexRange], bound: Option<usize>) -> Result<usize, DeltaError> {
    let mut previous_end = None;
    let mut total = 0;
    for range in ranges {
        if range.end < range.start {
            return Err(DeltaError::RangeInverted {
                start: range.start,
                end: range.end,
            });
        }
        if let Some(previous_end) = previous_end
            && range.start < previous_end
        {
            return Err(DeltaError::RangesOverlap {
                previous_end,
                start: range.start,
            });
        }
        if let Some(len) = bound
            && range.end > len
        {
            return Err(DeltaError::OutOfBounds {
                end: range.end,
                len,
            });
        }
        previous_end = Some(range.end);
        total += range.len();
    }
    Ok(total)
}

/// Removed, changed and appended items of an ordered collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDelta<T> {
    /// Ranges removed from the previous collection, ascending.
    pub removed: Vec<IndexRange>,
    /// Ranges of the post-removal collection whose items changed, ascending.
    pub changed_ranges: Vec<IndexRange>,
    /// Current snapshots for `changed_ranges`, concatenated in order.
    pub changed: Vec<T>,
    /// Items appended at the tail.
    pub added: Vec<T>,
}

impl<T> Default for CollectionDelta<T> {
    fn default() -> Self {
        Self {
            removed: Vec::new(),
            changed_ranges: Vec::new(),
            changed: Vec::new(),
            added: Vec::new(),
        }
    }
}

impl<T> CollectionDelta<T> {
    /// Whether the delta carries no change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.changed_ranges.is_empty() && self.added.is_empty()
    }

    /// Number of items removed from the previous collection.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed.iter().map(IndexRange::len).sum()
    }

    /// Apply the delta to `target`, which must hold the previous collection.
    ///
    /// # Errors
    ///
    /// Returns a [`DeltaError`] when a range does not fit `target` or the
    /// changed snapshots do not match the changed ranges. `target` is left
    /// untouched in that case.
    pub fn apply(self, target: &mut Vec<T>) -> Result<(), DeltaError> {
        let removed = validate_ranges(&self.removed, Some(target.len()))?;
        let remaining = target.len() - removed;
        let expected = validate_ranges(&self.changed_ranges, Some(remaining))?;
        if expected != self.changed.len() {
            return Err(DeltaError::ChangedCountMismatch {
                expected,
                actual: self.changed.len(),
            });
        }

        for range in self.removed.iter().rev() {
            target.drain(range.start..range.end);
        }

        let mut changed = self.changed.into_iter();
        for range in &self.changed_ranges {
            for (slot, item) in target[range.start..range.end].iter_mut().zip(&mut changed) {
                *slot = item;
            }
        }

        target.extend(self.added);
        Ok(())
    }
}

impl<T: Clone> CollectionDelta<T> {
    /// Build a delta from an engine range notification and the live collection.
    ///
    /// `live` is the current collection. Its last `added_count` items become
    /// `added`; `changed_ranges` index the items before that tail.
    ///
    /// # Errors
    ///
    /// Returns a [`DeltaError`] when the ranges are malformed or do not fit
    /// the live collection.
    pub fn slice(
        removed: Vec<IndexRange>,
        changed_ranges: Vec<IndexRange>,
        added_count: usize,
        live: &[T],
    ) -> Result<Self, DeltaError> {
        if added_count > live.len() {
            return Err(DeltaError::AddedExceedsLength {
                added: added_count,
                len: live.len(),
            });
        }
        let base_len = live.len() - added_count;
        validate_ranges(&removed, None)?;
        validate_ranges(&changed_ranges, Some(base_len))?;

        let changed = changed_ranges
            .iter()
            .flat_map(|range| live[range.start..range.end].iter().cloned())
            .collect();
        let added = live[base_len..].to_vec();

        Ok(Self {
            removed,
            changed_ranges,
            changed,
            added,
        })
    }
}
