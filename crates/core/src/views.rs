//! View controllers: what each pane fetches, when it may fetch, and how a
//! response lands in its model.
//!
//! Every controller hands out a [`FetchTicket`] from `begin_tick` and takes it
//! back in `apply` together with the fetch result. Responses for a subject the
//! view has since moved away from are dropped there.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::binding::ViewBinding;
use crate::columns::{details_columns, file_columns, peer_columns, torrent_columns, IconResolver};
use crate::config::{ClientConfig, SortConfig};
use crate::diff::SortOrder;
use crate::error::{ModelError, ModelResult};
use crate::poll::{FetchTicket, PollState};
use crate::projection::{CellValue, CheckState, Column, Role};
use crate::session::{Command, SessionEvent, StatusFilter};
use crate::signal::ModelSignal;
use crate::table::TableModel;
use crate::tree::{FileEntry, FileTree, NodeId, RenameIntent, DEFAULT_PRIORITY};
use crate::value::{Record, Snapshot, Value};

/// What became of one fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated,
    /// The view moved to another subject while the fetch was out.
    Stale,
    /// The fetch failed or lacked what the view needs; the last data stays.
    Failed,
}

fn settle<S, T>(
    poll: &mut PollState<S>,
    ticket: FetchTicket<S>,
    result: anyhow::Result<T>,
) -> Result<T, ApplyOutcome>
where
    S: Clone + PartialEq + std::fmt::Debug,
{
    match poll.complete(ticket, result.map_err(|e| format!("{:#}", e))) {
        Ok(value) => Ok(value),
        Err(ModelError::StaleResponse { .. }) => Err(ApplyOutcome::Stale),
        Err(_) => Err(ApplyOutcome::Failed),
    }
}

fn initial_sort(columns: &[Column], sort: &SortConfig) -> Option<(usize, SortOrder)> {
    let name = sort.column.as_deref()?;
    let column = columns.iter().position(|c| c.name() == name)?;
    let order = if sort.descending {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    Some((column, order))
}

pub struct TorrentListView {
    model: TableModel<String>,
    binding: ViewBinding<String>,
    poll: PollState<StatusFilter>,
    hidden: BTreeSet<String>,
    reported: Option<String>,
    selection_changed: bool,
}

impl TorrentListView {
    pub fn new(icons: Arc<dyn IconResolver>, config: &ClientConfig) -> Self {
        let mut model = TableModel::new(torrent_columns(icons));
        if let Some((column, order)) = initial_sort(model.columns(), &config.torrent_sort) {
            model.sort(column, order);
        }
        model.drain_signals();

        let mut poll = PollState::new();
        poll.set_subject(Some(StatusFilter::new()));
        Self {
            model,
            binding: ViewBinding::new(),
            poll,
            hidden: config.hidden_torrent_columns.iter().cloned().collect(),
            reported: None,
            selection_changed: false,
        }
    }

    pub fn model(&self) -> &TableModel<String> {
        &self.model
    }

    pub fn binding(&self) -> &ViewBinding<String> {
        &self.binding
    }

    pub fn filter(&self) -> Option<&StatusFilter> {
        self.poll.subject()
    }

    /// Follow a new status filter. The next tick fetches it right away.
    pub fn set_filter(&mut self, filter: StatusFilter) -> bool {
        let changed = self.poll.set_subject(Some(filter));
        if changed {
            self.poll.request_refresh();
        }
        changed
    }

    pub fn is_column_hidden(&self, name: &str) -> bool {
        self.hidden.contains(name)
    }

    pub fn set_column_hidden(&mut self, name: &str, hidden: bool) {
        if hidden {
            self.hidden.insert(name.to_string());
        } else if self.hidden.remove(name) {
            // Cached values for a column that was just shown are stale.
            let fields: Vec<String> = self
                .model
                .columns()
                .iter()
                .filter(|c| c.name() == name)
                .flat_map(|c| c.fields().iter().cloned())
                .collect();
            self.model.invalidate_fields(fields.iter().map(String::as_str));
            self.poll.request_refresh();
        }
    }

    /// Indices of the columns currently shown, in model order.
    pub fn visible_columns(&self) -> Vec<usize> {
        self.model
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !self.hidden.contains(c.name()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn required_fields(&self) -> Vec<String> {
        self.model.required_fields(|name| self.hidden.contains(name))
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.poll.set_visible(visible);
    }

    pub fn begin_tick(&mut self) -> Option<FetchTicket<StatusFilter>> {
        self.poll.begin_tick()
    }

    /// Whether an event or filter change asked for an early tick.
    pub fn wants_refresh(&mut self) -> bool {
        self.poll.take_refresh()
    }

    pub fn apply(
        &mut self,
        ticket: FetchTicket<StatusFilter>,
        result: anyhow::Result<Snapshot<String>>,
    ) -> ApplyOutcome {
        let snapshot = match settle(&mut self.poll, ticket, result) {
            Ok(snapshot) => snapshot,
            Err(outcome) => return outcome,
        };
        let applied = self.binding.apply(&mut self.model, |model| {
            model.update(snapshot);
            Ok(())
        });
        if let Err(e) = applied {
            warn!("torrent list update failed: {}", e);
            return ApplyOutcome::Failed;
        }
        self.note_selection();
        ApplyOutcome::Updated
    }

    /// The first selected torrent; the one the dependent panes follow.
    pub fn selected_torrent(&self) -> Option<String> {
        self.binding.selected_keys().first().cloned()
    }

    pub fn selected_torrents(&self) -> &[String] {
        self.binding.selected_keys()
    }

    /// Make `row` the only selected and the current torrent.
    pub fn select_row(&mut self, row: usize) -> bool {
        let Some(key) = self.model.key_at(row).cloned() else {
            return false;
        };
        self.binding.clear_selection();
        self.binding.select(&self.model, key.clone());
        self.binding.set_current(&mut self.model, &key);
        self.note_selection();
        true
    }

    pub fn toggle_row(&mut self, row: usize) {
        if let Some(key) = self.model.key_at(row).cloned() {
            self.binding.toggle(&self.model, key);
            self.note_selection();
        }
    }

    /// Move the current row by `delta`, clamped to the table.
    pub fn move_selection(&mut self, delta: isize) -> bool {
        let rows = self.model.row_count();
        if rows == 0 {
            return false;
        }
        let next = match self.binding.current_row(&self.model) {
            Some(row) => row.saturating_add_signed(delta).min(rows - 1),
            None => 0,
        };
        self.select_row(next)
    }

    pub fn current_row(&self) -> Option<usize> {
        self.binding.current_row(&self.model)
    }

    /// The selection change since the last call, if any.
    pub fn take_selection_change(&mut self) -> Option<Option<String>> {
        std::mem::take(&mut self.selection_changed).then(|| self.reported.clone())
    }

    pub fn sort_by(&mut self, column: usize, order: SortOrder) {
        self.model.sort(column, order);
    }

    /// Sort by `column`, flipping the order if it is already the sort column.
    pub fn toggle_sort(&mut self, column: usize) {
        let order = match self.model.sort_spec() {
            Some(spec) if spec.column == column => spec.order().toggled(),
            _ => SortOrder::Ascending,
        };
        self.sort_by(column, order);
    }

    pub fn handle_event(&mut self, event: &SessionEvent) {
        if event.changes_torrent_set() {
            debug!(?event, "torrent set changed, refreshing");
            self.poll.request_refresh();
        }
    }

    pub fn drain_signals(&mut self) -> Vec<ModelSignal> {
        self.model.drain_signals()
    }

    fn note_selection(&mut self) {
        let now = self.selected_torrent();
        if now != self.reported {
            debug!(from = ?self.reported, to = ?now, "torrent selection changed");
            self.reported = now;
            self.selection_changed = true;
        }
    }
}

/// Peers of the selected torrent, keyed by address.
pub struct PeerListView {
    model: TableModel<String>,
    binding: ViewBinding<String>,
    poll: PollState<String>,
}

pub const PEER_FIELDS: [&str; 1] = ["peers"];

fn peers_snapshot(record: &Record) -> Snapshot<String> {
    let Some(peers) = record.get("peers").and_then(Value::as_list) else {
        trace!("status has no peer list");
        return Snapshot::new();
    };
    peers
        .iter()
        .filter_map(|peer| {
            let fields = peer.as_map()?;
            let Some(ip) = fields.get("ip").and_then(Value::as_str) else {
                trace!(?peer, "peer without address");
                return None;
            };
            Some((ip.to_string(), Record::from(fields.clone())))
        })
        .collect()
}

impl PeerListView {
    pub fn new(icons: Arc<dyn IconResolver>, config: &ClientConfig) -> Self {
        let mut model = TableModel::new(peer_columns(icons));
        if let Some((column, order)) = initial_sort(model.columns(), &config.peer_sort) {
            model.sort(column, order);
        }
        model.drain_signals();
        Self {
            model,
            binding: ViewBinding::new(),
            poll: PollState::with_required_subject(),
        }
    }

    pub fn model(&self) -> &TableModel<String> {
        &self.model
    }

    pub fn binding(&self) -> &ViewBinding<String> {
        &self.binding
    }

    pub fn torrent(&self) -> Option<&str> {
        self.poll.subject().map(String::as_str)
    }

    /// Follow `torrent_id`. Clearing the subject empties the table.
    pub fn set_torrent(&mut self, torrent_id: Option<String>) -> bool {
        if !self.poll.set_subject(torrent_id) {
            return false;
        }
        self.binding.clear_selection();
        if self.poll.subject().is_none() {
            self.model.clear();
        }
        true
    }

    pub fn required_fields(&self) -> Vec<String> {
        PEER_FIELDS.iter().map(|f| f.to_string()).collect()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.poll.set_visible(visible);
    }

    pub fn begin_tick(&mut self) -> Option<FetchTicket<String>> {
        self.poll.begin_tick()
    }

    pub fn apply(&mut self, ticket: FetchTicket<String>, result: anyhow::Result<Record>) -> ApplyOutcome {
        let record = match settle(&mut self.poll, ticket, result) {
            Ok(record) => record,
            Err(outcome) => return outcome,
        };
        let snapshot = peers_snapshot(&record);
        match self.binding.apply(&mut self.model, |model| {
            model.update(snapshot);
            Ok(())
        }) {
            Ok(()) => ApplyOutcome::Updated,
            Err(e) => {
                warn!("peer list update failed: {}", e);
                ApplyOutcome::Failed
            }
        }
    }

    pub fn drain_signals(&mut self) -> Vec<ModelSignal> {
        self.model.drain_signals()
    }
}

pub const FILES_FIELD: &str = "files";
pub const FILE_STATUS_FIELDS: [&str; 2] = ["file_progress", "file_priorities"];

fn file_entry(value: &Value) -> Option<FileEntry> {
    let fields = value.as_map()?;
    let index = fields.get("index")?.as_i64()?;
    let path = fields.get("path")?.as_str()?;
    let size = fields.get("size").and_then(Value::as_i64).unwrap_or(0);
    let mut entry = FileEntry::new(usize::try_from(index).ok()?, path, size.max(0) as u64);
    entry.offset = fields
        .get("offset")
        .and_then(Value::as_i64)
        .map(|o| o.max(0) as u64)
        .unwrap_or(0);
    Some(entry)
}

fn file_entries(record: &Record) -> Option<Vec<FileEntry>> {
    let files = record.get(FILES_FIELD)?.as_list()?;
    files.iter().map(file_entry).collect()
}

fn file_status(record: &Record) -> Option<(Vec<f64>, Vec<i64>)> {
    let progress = record
        .get("file_progress")?
        .as_list()?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<_>>>()?;
    let priorities = record
        .get("file_priorities")?
        .as_list()?
        .iter()
        .map(Value::as_i64)
        .collect::<Option<Vec<_>>>()?;
    Some((progress, priorities))
}

/// File trees of torrents, one cached model per torrent.
pub struct FileTreeView {
    models: HashMap<String, FileTree>,
    bindings: HashMap<String, ViewBinding<NodeId>>,
    poll: PollState<String>,
    sort: SortConfig,
}

impl FileTreeView {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            models: HashMap::new(),
            bindings: HashMap::new(),
            poll: PollState::with_required_subject(),
            sort: config.file_sort.clone(),
        }
    }

    pub fn torrent(&self) -> Option<&str> {
        self.poll.subject().map(String::as_str)
    }

    pub fn set_torrent(&mut self, torrent_id: Option<String>) -> bool {
        self.poll.set_subject(torrent_id)
    }

    /// Model of the torrent being shown.
    pub fn current(&self) -> Option<&FileTree> {
        self.torrent().and_then(|id| self.models.get(id))
    }

    pub fn current_binding(&self) -> Option<&ViewBinding<NodeId>> {
        self.torrent().and_then(|id| self.bindings.get(id))
    }

    pub fn model(&self, torrent_id: &str) -> Option<&FileTree> {
        self.models.get(torrent_id)
    }

    pub fn cached(&self) -> usize {
        self.models.len()
    }

    /// The file list is fetched once per torrent; later polls only need the
    /// per-file status.
    pub fn required_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = FILE_STATUS_FIELDS.iter().map(|f| f.to_string()).collect();
        let cached = self.torrent().map(|id| self.models.contains_key(id)).unwrap_or(false);
        if !cached {
            fields.insert(0, FILES_FIELD.to_string());
        }
        fields
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.poll.set_visible(visible);
    }

    pub fn begin_tick(&mut self) -> Option<FetchTicket<String>> {
        self.poll.begin_tick()
    }

    /// Land a status fetch. Only an inconsistent file list is an error.
    pub fn apply(&mut self, ticket: FetchTicket<String>, result: anyhow::Result<Record>) -> ModelResult<ApplyOutcome> {
        let Some(torrent_id) = ticket.subject().cloned() else {
            return Ok(ApplyOutcome::Stale);
        };
        let record = match settle(&mut self.poll, ticket, result) {
            Ok(record) => record,
            Err(outcome) => return Ok(outcome),
        };

        if !self.models.contains_key(&torrent_id) {
            let Some(files) = file_entries(&record) else {
                warn!(torrent = %torrent_id, "status lacks a usable file list");
                return Ok(ApplyOutcome::Failed);
            };
            let mut tree = FileTree::new(file_columns());
            if let Some((column, order)) = initial_sort(tree.columns(), &self.sort) {
                tree.sort(column, order);
            }
            tree.update(files)?;
            let mut binding = ViewBinding::new();
            for &child in tree.children(NodeId::ROOT) {
                if !tree.is_file(child) {
                    binding.set_expanded(child, true);
                }
            }
            debug!(torrent = %torrent_id, files = tree.file_count(), "file tree built");
            self.models.insert(torrent_id.clone(), tree);
            self.bindings.insert(torrent_id.clone(), binding);
        }

        let Some((progress, priorities)) = file_status(&record) else {
            trace!(torrent = %torrent_id, "status has no per-file data");
            return Ok(ApplyOutcome::Updated);
        };
        let (Some(tree), Some(binding)) = (self.models.get_mut(&torrent_id), self.bindings.get_mut(&torrent_id))
        else {
            return Ok(ApplyOutcome::Failed);
        };
        binding.apply(tree, |tree| {
            tree.set_file_status(progress, priorities);
            Ok(())
        })?;
        Ok(ApplyOutcome::Updated)
    }

    pub fn on_file_renamed(&mut self, torrent_id: &str, index: usize, new_path: &str) -> ModelResult<()> {
        let (Some(tree), Some(binding)) = (self.models.get_mut(torrent_id), self.bindings.get_mut(torrent_id)) else {
            return Ok(());
        };
        binding.apply(tree, |tree| tree.rename(index, new_path))
    }

    pub fn on_folder_renamed(&mut self, torrent_id: &str, old_path: &str, new_path: &str) -> ModelResult<()> {
        let (Some(tree), Some(binding)) = (self.models.get_mut(torrent_id), self.bindings.get_mut(torrent_id)) else {
            return Ok(());
        };
        if tree.find_dir(old_path).is_none() && tree.find_dir(new_path).is_some() {
            trace!(torrent = %torrent_id, old_path, new_path, "folder rename already applied");
            return Ok(());
        }
        binding.apply(tree, |tree| tree.rename_folder(old_path, new_path))
    }

    pub fn on_torrent_removed(&mut self, torrent_id: &str) {
        if self.models.remove(torrent_id).is_some() {
            debug!(torrent = %torrent_id, "dropped cached file tree");
        }
        self.bindings.remove(torrent_id);
    }

    /// Set `priority` on `node` of the shown torrent and build the command.
    pub fn set_priority(&mut self, node: NodeId, priority: i64) -> ModelResult<Option<Command>> {
        let Some(torrent_id) = self.torrent().map(str::to_string) else {
            return Ok(None);
        };
        let (Some(tree), Some(binding)) = (self.models.get_mut(&torrent_id), self.bindings.get_mut(&torrent_id))
        else {
            return Ok(None);
        };
        let priorities = binding.apply(tree, |tree| tree.set_priority(node, priority))?;
        Ok(Some(Command::SetFilePriorities {
            torrent_id,
            priorities,
        }))
    }

    /// Checking a node downloads it at normal priority; unchecking skips it.
    pub fn toggle_checked(&mut self, node: NodeId) -> ModelResult<Option<Command>> {
        let Some(state) = self.current().and_then(|tree| tree.check_state(node)) else {
            return Ok(None);
        };
        let priority = match state {
            CheckState::Checked => 0,
            CheckState::Unchecked | CheckState::PartiallyChecked => DEFAULT_PRIORITY,
        };
        self.set_priority(node, priority)
    }

    /// Rename `node` of the shown torrent in place and build the command.
    pub fn rename(&mut self, node: NodeId, new_name: &str) -> ModelResult<Option<Command>> {
        let Some(torrent_id) = self.torrent().map(str::to_string) else {
            return Ok(None);
        };
        let (Some(tree), Some(binding)) = (self.models.get_mut(&torrent_id), self.bindings.get_mut(&torrent_id))
        else {
            return Ok(None);
        };
        let intent = binding.apply(tree, |tree| tree.request_rename(node, new_name))?;
        Ok(Some(match intent {
            RenameIntent::File { index, new_path } => Command::RenameFiles {
                torrent_id,
                renames: vec![(index, new_path)],
            },
            RenameIntent::Folder { old_path, new_path } => Command::RenameFolder {
                torrent_id,
                old_path,
                new_path,
            },
        }))
    }

    pub fn set_expanded(&mut self, node: NodeId, expanded: bool) {
        if let Some(binding) = self.torrent().map(str::to_string).and_then(|id| self.bindings.get_mut(&id)) {
            binding.set_expanded(node, expanded);
        }
    }

    /// Nodes a tree view would draw, in display order, with their depth.
    /// Children of collapsed folders are left out.
    pub fn visible_nodes(&self) -> Vec<(NodeId, usize)> {
        let (Some(tree), Some(binding)) = (self.current(), self.current_binding()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> =
            tree.children(NodeId::ROOT).iter().rev().map(|&n| (n, 0)).collect();
        while let Some((node, depth)) = stack.pop() {
            out.push((node, depth));
            if !tree.is_file(node) && binding.is_expanded(&node) {
                stack.extend(tree.children(node).iter().rev().map(|&n| (n, depth + 1)));
            }
        }
        out
    }

    /// Signals of the shown model. Every cached model is drained, and
    /// folders created by a patch are expanded.
    pub fn drain_signals(&mut self) -> Vec<ModelSignal> {
        let current = self.torrent().map(str::to_string);
        let mut out = Vec::new();
        for (torrent_id, tree) in self.models.iter_mut() {
            let signals = tree.drain_signals();
            if let Some(binding) = self.bindings.get_mut(torrent_id) {
                for signal in &signals {
                    if let ModelSignal::NodesCreated(nodes) = signal {
                        for &node in nodes {
                            if !tree.is_file(node) {
                                binding.set_expanded(node, true);
                            }
                        }
                    }
                }
            }
            if current.as_deref() == Some(torrent_id.as_str()) {
                out = signals;
            }
        }
        out
    }
}

/// Labelled lines describing one torrent.
pub struct DetailsView {
    columns: Vec<Column>,
    poll: PollState<String>,
    status: Option<Record>,
}

impl Default for DetailsView {
    fn default() -> Self {
        Self::new()
    }
}

impl DetailsView {
    pub fn new() -> Self {
        Self {
            columns: details_columns(),
            poll: PollState::with_required_subject(),
            status: None,
        }
    }

    pub fn torrent(&self) -> Option<&str> {
        self.poll.subject().map(String::as_str)
    }

    pub fn set_torrent(&mut self, torrent_id: Option<String>) -> bool {
        let changed = self.poll.set_subject(torrent_id);
        if changed {
            self.status = None;
        }
        changed
    }

    pub fn required_fields(&self) -> Vec<String> {
        let fields: BTreeSet<String> = self
            .columns
            .iter()
            .flat_map(|c| c.fields().iter().cloned())
            .collect();
        fields.into_iter().collect()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.poll.set_visible(visible);
    }

    pub fn begin_tick(&mut self) -> Option<FetchTicket<String>> {
        self.poll.begin_tick()
    }

    pub fn apply(&mut self, ticket: FetchTicket<String>, result: anyhow::Result<Record>) -> ApplyOutcome {
        match settle(&mut self.poll, ticket, result) {
            Ok(record) => {
                self.status = Some(record);
                ApplyOutcome::Updated
            }
            Err(outcome) => outcome,
        }
    }

    pub fn status(&self) -> Option<&Record> {
        self.status.as_ref()
    }

    /// `(label, text)` per line; lines with nothing to show render empty.
    pub fn lines(&self) -> Vec<(&str, String)> {
        let Some(status) = &self.status else {
            return Vec::new();
        };
        self.columns
            .iter()
            .map(|column| {
                let text = column
                    .format(Role::Display, status)
                    .and_then(|cell| match cell {
                        CellValue::Text(text) => Some(text),
                        _ => None,
                    })
                    .unwrap_or_default();
                (column.name(), text)
            })
            .collect()
    }

    /// Progress as a fraction, for a progress bar.
    pub fn progress(&self) -> Option<f64> {
        let status = self.status.as_ref()?;
        self.columns
            .iter()
            .find(|c| c.name() == "Progress")?
            .format(Role::User, status)?
            .as_number()
    }
}
