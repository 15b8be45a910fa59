//! Change notifications from models to views.
//!
//! A structural update is bracketed by `LayoutAboutToBeChanged` and
//! `LayoutChanged`. The first is a hook for views that snapshot state before
//! rows move; listeners that only redraw can ignore it and act on
//! `LayoutChanged` alone.

use std::ops::RangeInclusive;

use crate::tree::NodeId;

/// Change notification a model hands to whatever view is attached to it.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSignal {
    /// Cells in `rows × columns` under `parent` changed value; the row set
    /// and order are untouched. `parent` is `None` for flat models and for
    /// the top level of a tree.
    DataChanged {
        parent: Option<NodeId>,
        rows: RangeInclusive<usize>,
        columns: RangeInclusive<usize>,
    },
    LayoutAboutToBeChanged,
    /// Rows moved, appeared or disappeared; persistent references have been
    /// remapped by the time this is emitted.
    LayoutChanged,
    ModelReset,
    /// Directory nodes created by a patch or rename, for auto-expansion.
    NodesCreated(Vec<NodeId>),
}

impl ModelSignal {
    /// Rows may have moved, appeared or disappeared.
    pub fn is_layout_change(&self) -> bool {
        matches!(self, ModelSignal::LayoutChanged | ModelSignal::ModelReset)
    }
}

/// Outbox of signals, drained by the view after each mutation.
#[derive(Debug, Default)]
pub struct SignalQueue {
    pending: Vec<ModelSignal>,
}

impl SignalQueue {
    pub fn emit(&mut self, signal: ModelSignal) {
        tracing::debug!(?signal, "model signal");
        self.pending.push(signal);
    }

    pub fn drain(&mut self) -> Vec<ModelSignal> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
