use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use tracing::{debug, warn};

use crate::binding::KeyedModel;
use crate::diff::{diff, stable_sort, DiffOutcome, SortOrder, SortSpec};
use crate::persistent::{PersistentIndex, PersistentRef};
use crate::projection::{columns_for_fields, CellValue, Column, Role};
use crate::signal::{ModelSignal, SignalQueue};
use crate::value::{Record, Snapshot};

/// Single-level list model over a keyed snapshot (torrents, peers).
#[derive(Debug)]
pub struct TableModel<K: Eq + Hash> {
    columns: Vec<Column>,
    items: Snapshot<K>,
    order: Vec<K>,
    rows: HashMap<K, usize>,
    sort: Option<SortSpec>,
    persistent: PersistentIndex<K>,
    signals: SignalQueue,
}

impl<K> TableModel<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            items: Snapshot::new(),
            order: Vec::new(),
            rows: HashMap::new(),
            sort: None,
            persistent: PersistentIndex::new(),
            signals: SignalQueue::default(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.order.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, column: usize) -> Option<&Column> {
        self.columns.get(column)
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn header(&self, column: usize) -> Option<&str> {
        self.columns.get(column).map(Column::name)
    }

    pub fn sort_spec(&self) -> Option<SortSpec> {
        self.sort
    }

    pub fn data(&self, row: usize, column: usize, role: Role) -> Option<CellValue> {
        let record = self.record_at(row)?;
        self.columns.get(column)?.format(role, record)
    }

    pub fn record_at(&self, row: usize) -> Option<&Record> {
        self.items.get(self.order.get(row)?)
    }

    pub fn key_at(&self, row: usize) -> Option<&K> {
        self.order.get(row)
    }

    /// Keys behind `rows`, skipping rows out of range.
    pub fn keys_at(&self, rows: &[usize]) -> Vec<K> {
        rows.iter().filter_map(|&r| self.order.get(r).cloned()).collect()
    }

    pub fn row_of(&self, key: &K) -> Option<usize> {
        self.rows.get(key).copied()
    }

    /// Keys in visual order.
    pub fn order(&self) -> &[K] {
        &self.order
    }

    pub fn snapshot(&self) -> &Snapshot<K> {
        &self.items
    }

    /// Replace the snapshot, emitting the narrowest signal that describes
    /// the change.
    pub fn update(&mut self, snapshot: Snapshot<K>) {
        match diff(&self.items, &self.order, &snapshot, &self.columns, self.sort) {
            DiffOutcome::Unchanged => {}
            DiffOutcome::DataOnly { rows, fields } => {
                self.items = snapshot;
                let columns = columns_for_fields(&self.columns, fields.iter().map(String::as_str));
                match (rows.first(), rows.last(), columns.first(), columns.last()) {
                    (Some(&first), Some(&last), Some(&left), Some(&right)) => {
                        self.signals.emit(ModelSignal::DataChanged {
                            parent: None,
                            rows: first..=last,
                            columns: left..=right,
                        });
                    }
                    _ => debug!(?fields, "no displayed column reads the changed fields"),
                }
            }
            DiffOutcome::Structural {
                order,
                added,
                removed,
            } => {
                self.signals.emit(ModelSignal::LayoutAboutToBeChanged);
                self.items = snapshot;
                self.relayout(order);
                debug!(added = added.len(), removed = removed.len(), "table re-laid out");
                self.signals.emit(ModelSignal::LayoutChanged);
            }
        }
    }

    /// Sort by `column`; always re-lays out. An unknown column is ignored.
    pub fn sort(&mut self, column: usize, order: SortOrder) {
        let Some(col) = self.columns.get(column) else {
            warn!(column, "sort requested on unknown column");
            return;
        };
        self.sort = Some(SortSpec::new(column, order));
        self.signals.emit(ModelSignal::LayoutAboutToBeChanged);
        let sorted = stable_sort(self.order.clone(), &self.items, col, order.is_descending());
        self.relayout(sorted);
        self.signals.emit(ModelSignal::LayoutChanged);
    }

    pub fn clear(&mut self) {
        self.items = Snapshot::new();
        self.order.clear();
        self.rows.clear();
        self.persistent.invalidate_all();
        self.signals.emit(ModelSignal::ModelReset);
    }

    /// Fields a fetch must request: those of visible columns and of the
    /// sort column, sorted and de-duplicated.
    pub fn required_fields<F>(&self, is_hidden: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut fields = BTreeSet::new();
        for column in self.columns.iter().filter(|c| !is_hidden(c.name())) {
            fields.extend(column.fields().iter().cloned());
        }
        if let Some(column) = self.sort.and_then(|s| self.columns.get(s.column)) {
            fields.extend(column.fields().iter().cloned());
        }
        fields.into_iter().collect()
    }

    pub fn columns_for_fields<'a, I>(&self, fields: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        columns_for_fields(&self.columns, fields)
    }

    /// Announce that cells reading `fields` must be repainted although the
    /// records did not change, e.g. when a lazily resolved icon arrives.
    pub fn invalidate_fields<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let columns = columns_for_fields(&self.columns, fields);
        let (Some(&left), Some(&right)) = (columns.first(), columns.last()) else {
            return;
        };
        if self.order.is_empty() {
            return;
        }
        self.signals.emit(ModelSignal::DataChanged {
            parent: None,
            rows: 0..=self.order.len() - 1,
            columns: left..=right,
        });
    }

    pub fn persistent_index(&mut self, key: &K, column: usize) -> Option<PersistentRef> {
        let row = self.row_of(key)?;
        Some(self.persistent.register(key.clone(), row, column))
    }

    pub fn persistent_row(&self, handle: PersistentRef) -> Option<usize> {
        self.persistent.row(handle)
    }

    pub fn persistent_key(&self, handle: PersistentRef) -> Option<&K> {
        self.persistent.key(handle)
    }

    pub fn release(&mut self, handle: PersistentRef) {
        self.persistent.release(handle);
    }

    pub fn drain_signals(&mut self) -> Vec<ModelSignal> {
        self.signals.drain()
    }

    fn relayout(&mut self, order: Vec<K>) {
        self.rows = order.iter().cloned().enumerate().map(|(i, k)| (k, i)).collect();
        self.order = order;
        let stats = self.persistent.remap_to_order(&self.order);
        if stats.invalidated > 0 {
            debug!(invalidated = stats.invalidated, "persistent references dropped");
        }
    }
}

impl<K> KeyedModel for TableModel<K>
where
    K: Clone + Eq + Hash + Ord,
{
    type Key = K;

    fn position_of(&self, key: &K) -> Option<usize> {
        self.row_of(key)
    }

    fn persistent_index(&mut self, key: &K, column: usize) -> Option<PersistentRef> {
        TableModel::persistent_index(self, key, column)
    }

    fn persistent_key(&self, handle: PersistentRef) -> Option<K> {
        self.persistent.key(handle).cloned()
    }

    fn persistent_row(&self, handle: PersistentRef) -> Option<usize> {
        self.persistent.row(handle)
    }

    fn release(&mut self, handle: PersistentRef) {
        self.persistent.release(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projection;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("Name", 20).text(Projection::field("name")),
            Column::new("Rate", 8).text(Projection::field("rate")),
        ]
    }

    fn record(name: &str, rate: i64) -> Record {
        Record::new().with("name", name).with("rate", rate)
    }

    #[test]
    fn test_rate_change_is_one_narrow_cell_signal() {
        let mut model: TableModel<String> = TableModel::new(columns());
        let first = Snapshot::new()
            .with("a".into(), record("alpha", 1))
            .with("b".into(), record("beta", 2));
        model.update(first.clone());
        model.drain_signals();

        let mut second = first;
        second.insert("b".into(), record("beta", 5));
        model.update(second);

        let signals = model.drain_signals();
        assert_eq!(
            signals,
            vec![ModelSignal::DataChanged {
                parent: None,
                rows: 1..=1,
                columns: 1..=1,
            }]
        );
    }

    #[test]
    fn test_sort_on_unknown_column_is_ignored() {
        let mut model: TableModel<String> = TableModel::new(columns());
        model.sort(9, SortOrder::Ascending);
        assert!(model.drain_signals().is_empty());
        assert_eq!(model.sort_spec(), None);
    }

    #[test]
    fn test_clear_invalidates_references() {
        let mut model: TableModel<String> = TableModel::new(columns());
        model.update(Snapshot::new().with("a".into(), record("alpha", 1)));
        let handle = model.persistent_index(&"a".to_string(), 0).unwrap();
        model.clear();
        assert_eq!(model.persistent_row(handle), None);
        assert_eq!(model.drain_signals().last(), Some(&ModelSignal::ModelReset));
    }
}
