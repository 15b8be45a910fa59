//! Snapshot reconciliation for keyed record collections.
//!
//! The common case on every poll is a data-only update (same torrents, new
//! rates). It must keep the visual order untouched and report only the rows
//! and fields that changed, so that views repaint a narrow region. Anything
//! that changes the key set is structural and recomputes the order with a
//! stable sort.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

use tracing::warn;

use crate::error::ModelError;
use crate::projection::Column;
use crate::sort_key::SortKey;
use crate::value::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn is_descending(self) -> bool {
        self == SortOrder::Descending
    }

    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// Active sort column and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: usize,
    pub descending: bool,
}

impl SortSpec {
    pub fn new(column: usize, order: SortOrder) -> Self {
        Self {
            column,
            descending: order.is_descending(),
        }
    }

    pub fn order(&self) -> SortOrder {
        if self.descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }

    pub fn ascending(column: usize) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn descending(column: usize) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// What a snapshot replacement amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome<K> {
    /// Structurally identical snapshots.
    Unchanged,
    /// Same keys, same order. `rows` are positions in the existing order
    /// whose record changed, ascending; `fields` is the union of changed
    /// field names.
    DataOnly {
        rows: Vec<usize>,
        fields: BTreeSet<String>,
    },
    /// The order must be replaced by `order`.
    Structural {
        order: Vec<K>,
        added: Vec<K>,
        removed: Vec<K>,
    },
}

impl<K> DiffOutcome<K> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, DiffOutcome::Unchanged)
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, DiffOutcome::Structural { .. })
    }
}

/// Compare `new` against `old` (displayed in `old_order`) under `sort`.
pub fn diff<K>(
    old: &Snapshot<K>,
    old_order: &[K],
    new: &Snapshot<K>,
    columns: &[Column],
    sort: Option<SortSpec>,
) -> DiffOutcome<K>
where
    K: Clone + Eq + Hash + Ord,
{
    if old == new {
        return DiffOutcome::Unchanged;
    }

    let sort_column = sort.and_then(|s| columns.get(s.column).map(|c| (c, s.descending)));

    if old.same_keys(new) {
        let mut rows = Vec::new();
        let mut fields = BTreeSet::new();
        for (row, key) in old_order.iter().enumerate() {
            let (Some(before), Some(after)) = (old.get(key), new.get(key)) else {
                continue;
            };
            if before != after {
                rows.push(row);
                fields.extend(before.changed_fields(after).map(str::to_string));
            }
        }

        let Some((column, descending)) = sort_column
            .filter(|(column, _)| column.reads_any(fields.iter().map(String::as_str)))
        else {
            return DiffOutcome::DataOnly { rows, fields };
        };

        let resorted = stable_sort(old_order.to_vec(), new, column, descending);
        if resorted.as_slice() == old_order {
            return DiffOutcome::DataOnly { rows, fields };
        }
        return DiffOutcome::Structural {
            order: resorted,
            added: Vec::new(),
            removed: Vec::new(),
        };
    }

    let survivors: HashSet<&K> = old_order.iter().filter(|k| new.contains_key(k)).collect();
    let removed: Vec<K> = old_order
        .iter()
        .filter(|k| !survivors.contains(k))
        .cloned()
        .collect();
    let mut added: Vec<K> = new.keys().filter(|k| !old.contains_key(k)).cloned().collect();
    added.sort();

    let mut base: Vec<K> = old_order
        .iter()
        .filter(|k| survivors.contains(k))
        .cloned()
        .collect();
    base.extend(added.iter().cloned());

    let order = match sort_column {
        Some((column, descending)) => stable_sort(base, new, column, descending),
        None => base,
    };

    DiffOutcome::Structural {
        order,
        added,
        removed,
    }
}

/// Stable sort of `keys` by `column`'s sort projection over `records`.
///
/// If any key cannot be evaluated, or two keys are incomparable, the input
/// order is returned unchanged.
pub fn stable_sort<K>(keys: Vec<K>, records: &Snapshot<K>, column: &Column, descending: bool) -> Vec<K>
where
    K: Clone + Eq + Hash,
{
    let sorted = sort_by_column(&keys, column, descending, |key| {
        let record = records.get(key).ok_or_else(|| ModelError::SortKeyUnavailable {
            column: column.name().to_string(),
        })?;
        column.sort_key(record)
    });
    match sorted {
        Ok(sorted) => sorted,
        Err(e) => {
            warn!(column = column.name(), "keeping current order: {}", e);
            keys
        }
    }
}

/// Order `items` by the sort key `key_of` computes for each of them.
///
/// Any evaluation failure, missing key or incomparable pair makes the whole
/// sort fail with `SortKeyUnavailable`.
pub(crate) fn sort_by_column<T, F>(
    items: &[T],
    column: &Column,
    descending: bool,
    mut key_of: F,
) -> Result<Vec<T>, ModelError>
where
    T: Clone,
    F: FnMut(&T) -> Result<Option<SortKey>, ModelError>,
{
    let unavailable = || ModelError::SortKeyUnavailable {
        column: column.name().to_string(),
    };

    let mut decorated: Vec<(SortKey, &T)> = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = key_of(item).map_err(|_| unavailable())?.ok_or_else(unavailable)?;
        decorated.push((sort_key, item));
    }

    let incomparable = Cell::new(false);
    decorated.sort_by(|(a, _), (b, _)| {
        let ordering = match a.try_cmp(b) {
            Some(ordering) => ordering,
            None => {
                incomparable.set(true);
                Ordering::Equal
            }
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    if incomparable.get() {
        return Err(unavailable());
    }
    Ok(decorated.into_iter().map(|(_, item)| item.clone()).collect())
}
