use std::collections::HashMap;
use std::hash::Hash;

/// Opaque handle to a `(key, column)` pair that survives model restructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersistentRef(u64);

#[derive(Debug, Clone)]
struct Entry<K> {
    key: Option<K>,
    column: usize,
    row: Option<usize>,
}

/// Counts reported by a remap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemapStats {
    pub moved: usize,
    pub invalidated: usize,
}

/// Registry of persistent references owned by a model.
///
/// The model calls [`PersistentIndex::remap`] on every re-layout, so a
/// handle either reports the key's current row or reports invalid; it never
/// reports a row that now holds a different key.
#[derive(Debug, Clone)]
pub struct PersistentIndex<K> {
    next_id: u64,
    entries: HashMap<PersistentRef, Entry<K>>,
}

impl<K> Default for PersistentIndex<K> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> PersistentIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: K, row: usize, column: usize) -> PersistentRef {
        let handle = PersistentRef(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            handle,
            Entry {
                key: Some(key),
                column,
                row: Some(row),
            },
        );
        handle
    }

    pub fn release(&mut self, handle: PersistentRef) {
        self.entries.remove(&handle);
    }

    pub fn row(&self, handle: PersistentRef) -> Option<usize> {
        self.entries.get(&handle).and_then(|e| e.row)
    }

    pub fn column(&self, handle: PersistentRef) -> Option<usize> {
        self.entries
            .get(&handle)
            .filter(|e| e.key.is_some())
            .map(|e| e.column)
    }

    pub fn key(&self, handle: PersistentRef) -> Option<&K> {
        self.entries.get(&handle).and_then(|e| e.key.as_ref())
    }

    pub fn is_valid(&self, handle: PersistentRef) -> bool {
        self.key(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point every live handle at `locate(key)`; handles whose key is gone
    /// become invalid and stay invalid.
    pub fn remap<F>(&mut self, mut locate: F) -> RemapStats
    where
        F: FnMut(&K) -> Option<usize>,
    {
        let mut stats = RemapStats::default();
        for entry in self.entries.values_mut() {
            let Some(key) = entry.key.as_ref() else {
                continue;
            };
            match locate(key) {
                Some(row) => {
                    if entry.row != Some(row) {
                        stats.moved += 1;
                    }
                    entry.row = Some(row);
                }
                None => {
                    entry.key = None;
                    entry.row = None;
                    stats.invalidated += 1;
                }
            }
        }
        stats
    }

    /// Remap against a flat visual order.
    pub fn remap_to_order(&mut self, order: &[K]) -> RemapStats {
        let rows: HashMap<&K, usize> = order.iter().enumerate().map(|(i, k)| (k, i)).collect();
        self.remap(|key| rows.get(key).copied())
    }

    pub fn invalidate_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.key = None;
            entry.row = None;
        }
    }
}
