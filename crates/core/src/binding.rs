use std::collections::HashSet;
use std::hash::Hash;

use tracing::debug;

use crate::error::ModelResult;
use crate::persistent::PersistentRef;

/// What a view needs from a model to keep its state across restructuring.
pub trait KeyedModel {
    type Key: Clone + Eq + Hash;

    /// Row of `key` under its parent, if present.
    fn position_of(&self, key: &Self::Key) -> Option<usize>;

    fn contains_key(&self, key: &Self::Key) -> bool {
        self.position_of(key).is_some()
    }

    fn persistent_index(&mut self, key: &Self::Key, column: usize) -> Option<PersistentRef>;
    fn persistent_key(&self, handle: PersistentRef) -> Option<Self::Key>;
    fn persistent_row(&self, handle: PersistentRef) -> Option<usize>;
    fn release(&mut self, handle: PersistentRef);
}

/// Selection, current item, expansion and edit state of one view.
#[derive(Debug)]
pub struct ViewBinding<K> {
    selected: Vec<K>,
    current: Option<PersistentRef>,
    expanded: HashSet<K>,
    editing: Option<(K, usize)>,
    orphaned: Vec<PersistentRef>,
}

impl<K> Default for ViewBinding<K> {
    fn default() -> Self {
        Self {
            selected: Vec::new(),
            current: None,
            expanded: HashSet::new(),
            editing: None,
            orphaned: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> ViewBinding<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an update scope around a model mutation.
    pub fn begin_update(&mut self) -> UpdateScope<'_, K> {
        UpdateScope {
            binding: self,
            committed: false,
        }
    }

    /// Run `mutate` inside an update scope. On error the scope is dropped
    /// uncommitted and the captured state is invalidated.
    pub fn apply<M, F, T>(&mut self, model: &mut M, mutate: F) -> ModelResult<T>
    where
        M: KeyedModel<Key = K>,
        F: FnOnce(&mut M) -> ModelResult<T>,
    {
        self.release_orphans(model);
        let scope = self.begin_update();
        let out = mutate(model)?;
        scope.end_update(model);
        Ok(out)
    }

    pub fn select<M: KeyedModel<Key = K>>(&mut self, model: &M, key: K) {
        if model.contains_key(&key) && !self.selected.contains(&key) {
            self.selected.push(key);
        }
    }

    pub fn toggle<M: KeyedModel<Key = K>>(&mut self, model: &M, key: K) {
        match self.selected.iter().position(|k| *k == key) {
            Some(pos) => {
                self.selected.remove(pos);
            }
            None => self.select(model, key),
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Selected keys in the order they were selected.
    pub fn selected_keys(&self) -> &[K] {
        &self.selected
    }

    /// Current rows of the selected keys, ascending.
    pub fn selected_rows<M: KeyedModel<Key = K>>(&self, model: &M) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .selected
            .iter()
            .filter_map(|k| model.position_of(k))
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Make `key` the current item. Returns false if the model lacks it.
    pub fn set_current<M: KeyedModel<Key = K>>(&mut self, model: &mut M, key: &K) -> bool {
        self.release_orphans(model);
        if let Some(old) = self.current.take() {
            model.release(old);
        }
        self.current = model.persistent_index(key, 0);
        self.current.is_some()
    }

    pub fn current_key<M: KeyedModel<Key = K>>(&self, model: &M) -> Option<K> {
        self.current.and_then(|h| model.persistent_key(h))
    }

    pub fn current_row<M: KeyedModel<Key = K>>(&self, model: &M) -> Option<usize> {
        self.current.and_then(|h| model.persistent_row(h))
    }

    pub fn set_expanded(&mut self, key: K, expanded: bool) {
        if expanded {
            self.expanded.insert(key);
        } else {
            self.expanded.remove(&key);
        }
    }

    pub fn is_expanded(&self, key: &K) -> bool {
        self.expanded.contains(key)
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    pub fn begin_edit(&mut self, key: K, column: usize) {
        self.editing = Some((key, column));
    }

    /// Finish the in-progress edit, returning what was being edited.
    pub fn end_edit(&mut self) -> Option<(K, usize)> {
        self.editing.take()
    }

    pub fn editing(&self) -> Option<&(K, usize)> {
        self.editing.as_ref()
    }

    fn release_orphans<M: KeyedModel<Key = K>>(&mut self, model: &mut M) {
        for handle in self.orphaned.drain(..) {
            model.release(handle);
        }
    }

    fn invalidate(&mut self) {
        self.selected.clear();
        self.expanded.clear();
        self.editing = None;
        if let Some(handle) = self.current.take() {
            self.orphaned.push(handle);
        }
    }
}

/// Guard returned by [`ViewBinding::begin_update`].
///
/// Committing with [`UpdateScope::end_update`] keeps whatever survived the
/// mutation. Dropping the scope uncommitted throws the view state away.
#[must_use = "an uncommitted update scope invalidates the view state"]
pub struct UpdateScope<'a, K: Clone + Eq + Hash> {
    binding: &'a mut ViewBinding<K>,
    committed: bool,
}

impl<K: Clone + Eq + Hash> UpdateScope<'_, K> {
    pub fn end_update<M: KeyedModel<Key = K>>(mut self, model: &M) {
        let binding = &mut *self.binding;
        let before = binding.selected.len();
        binding.selected.retain(|k| model.contains_key(k));
        binding.expanded.retain(|k| model.contains_key(k));
        if let Some((key, _)) = &binding.editing {
            if !model.contains_key(key) {
                binding.editing = None;
            }
        }
        if let Some(handle) = binding.current {
            if model.persistent_key(handle).is_none() {
                binding.current = None;
                binding.orphaned.push(handle);
            }
        }
        if binding.selected.len() != before {
            debug!(dropped = before - binding.selected.len(), "selection trimmed");
        }
        self.committed = true;
    }
}

impl<K: Clone + Eq + Hash> Drop for UpdateScope<'_, K> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("update scope dropped uncommitted, invalidating view state");
            self.binding.invalidate();
        }
    }
}
