//! Directory tree synthesized from a torrent's flat file list.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Ids are handed out from a
//! counter and never reused, so a view can hold on to a folder (for its
//! expansion state) across renames that move it elsewhere in the tree.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::binding::KeyedModel;
use crate::diff::{sort_by_column, SortOrder, SortSpec};
use crate::error::{ModelError, ModelResult};
use crate::natsort::NaturalKey;
use crate::persistent::{PersistentIndex, PersistentRef};
use crate::projection::{columns_for_fields, CellValue, CheckState, Column, Role};
use crate::signal::{ModelSignal, SignalQueue};
use crate::value::{FieldSource, Value};

pub const SEPARATOR: char = '/';

/// Priority given to files the daemon has not reported a priority for.
pub const DEFAULT_PRIORITY: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// One file as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub index: usize,
    pub path: String,
    pub size: u64,
    #[serde(default)]
    pub offset: u64,
}

impl FileEntry {
    pub fn new(index: usize, path: impl Into<String>, size: u64) -> Self {
        Self {
            index,
            path: path.into(),
            size,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    file: Option<usize>,
}

impl Node {
    fn dir(name: &str, parent: NodeId) -> Self {
        Self {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            file: None,
        }
    }

    fn file(name: &str, parent: NodeId, index: usize) -> Self {
        Self {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            file: Some(index),
        }
    }
}

/// What an optimistic local rename asks the daemon to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameIntent {
    File { index: usize, new_path: String },
    Folder { old_path: String, new_path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Dir,
    File,
}

/// Check that `paths` can coexist in one tree: no empty components, no
/// duplicate files, and no path that is a file in one place and a directory
/// in another.
fn validate_paths<'a, I>(paths: I) -> ModelResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut kinds: HashMap<&str, PathKind> = HashMap::new();
    for path in paths {
        if path.split(SEPARATOR).any(str::is_empty) {
            return Err(ModelError::invariant(format!("empty path component in `{}`", path)));
        }
        for (pos, _) in path.match_indices(SEPARATOR) {
            let prefix = &path[..pos];
            if kinds.insert(prefix, PathKind::Dir) == Some(PathKind::File) {
                return Err(ModelError::invariant(format!(
                    "`{}` is both a file and a directory",
                    prefix
                )));
            }
        }
        match kinds.insert(path, PathKind::File) {
            None => {}
            Some(PathKind::File) => {
                return Err(ModelError::invariant(format!("duplicate file `{}`", path)));
            }
            Some(PathKind::Dir) => {
                return Err(ModelError::invariant(format!(
                    "`{}` is both a file and a directory",
                    path
                )));
            }
        }
    }
    Ok(())
}

fn split_path(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).collect()
}

fn row_in(nodes: &HashMap<NodeId, Node>, id: NodeId) -> Option<usize> {
    let parent = nodes.get(&id)?.parent?;
    nodes.get(&parent)?.children.iter().position(|&c| c == id)
}

#[derive(Debug)]
pub struct FileTree {
    columns: Vec<Column>,
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    files: BTreeMap<usize, FileEntry>,
    file_nodes: HashMap<usize, NodeId>,
    progress: Vec<f64>,
    priorities: Vec<i64>,
    sort: Option<SortSpec>,
    persistent: PersistentIndex<NodeId>,
    signals: SignalQueue,
}

impl FileTree {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            NodeId::ROOT,
            Node {
                name: String::new(),
                parent: None,
                children: Vec::new(),
                file: None,
            },
        );
        Self {
            columns,
            nodes,
            next_id: 1,
            files: BTreeMap::new(),
            file_nodes: HashMap::new(),
            progress: Vec::new(),
            priorities: Vec::new(),
            sort: None,
            persistent: PersistentIndex::new(),
            signals: SignalQueue::default(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn header(&self, column: usize) -> Option<&str> {
        self.columns.get(column).map(Column::name)
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn sort_spec(&self) -> Option<SortSpec> {
        self.sort
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(&node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of `node`; top-level nodes have `ROOT` as parent, the root none.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent
    }

    pub fn row(&self, node: NodeId) -> Option<usize> {
        row_in(&self.nodes, node)
    }

    pub fn node_at(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.nodes.get(&parent)?.children.get(row).copied()
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.name.as_str())
    }

    pub fn is_file(&self, node: NodeId) -> bool {
        self.file_index(node).is_some()
    }

    pub fn file_index(&self, node: NodeId) -> Option<usize> {
        self.nodes.get(&node)?.file
    }

    pub fn file_node(&self, index: usize) -> Option<NodeId> {
        self.file_nodes.get(&index).copied()
    }

    /// Full path of `node`, rebuilt from its ancestor chain.
    pub fn path(&self, node: NodeId) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = node;
        while current != NodeId::ROOT {
            let n = self.nodes.get(&current)?;
            parts.push(n.name.as_str());
            current = n.parent?;
        }
        parts.reverse();
        Some(parts.join("/"))
    }

    /// Directory at `path`, `ROOT` for the empty path.
    pub fn find_dir(&self, path: &str) -> Option<NodeId> {
        let node = self.find(path)?;
        (!self.is_file(node)).then_some(node)
    }

    fn find(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(NodeId::ROOT);
        }
        let mut current = NodeId::ROOT;
        for part in path.split(SEPARATOR) {
            current = self.child_named(current, part)?;
        }
        Some(current)
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes
            .get(&parent)?
            .children
            .iter()
            .copied()
            .find(|c| self.nodes.get(c).map(|n| n.name == name).unwrap_or(false))
    }

    /// Every directory node except the root, parents before children.
    pub fn directories(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(node) = stack.pop() {
            for &child in self.children(node).iter().rev() {
                if !self.is_file(child) {
                    out.push(child);
                    stack.push(child);
                }
            }
        }
        out
    }

    pub fn data(&self, node: NodeId, column: usize, role: Role) -> Option<CellValue> {
        if node == NodeId::ROOT || !self.nodes.contains_key(&node) {
            return None;
        }
        self.columns.get(column)?.format(role, &self.item(node))
    }

    pub fn check_state(&self, node: NodeId) -> Option<CheckState> {
        let mut any_on = false;
        let mut any_off = false;
        for index in self.leaves(node) {
            if self.priority_of(index) > 0 {
                any_on = true;
            } else {
                any_off = true;
            }
        }
        match (any_on, any_off) {
            (true, false) => Some(CheckState::Checked),
            (false, true) => Some(CheckState::Unchecked),
            (true, true) => Some(CheckState::PartiallyChecked),
            (false, false) => None,
        }
    }

    fn item(&self, node: NodeId) -> TreeItem<'_> {
        TreeItem { tree: self, node }
    }

    fn priority_of(&self, index: usize) -> i64 {
        self.priorities.get(index).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    fn progress_of(&self, index: usize) -> f64 {
        self.progress.get(index).copied().unwrap_or(0.0)
    }

    /// File indices under `node` (the node itself when it is a file).
    fn leaves(&self, node: NodeId) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(n) = self.nodes.get(&current) else {
                continue;
            };
            match n.file {
                Some(index) => out.push(index),
                None => stack.extend(n.children.iter().copied()),
            }
        }
        out.sort_unstable();
        out
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Replace the file list.
    ///
    /// The first population builds the tree and resets the model; later
    /// calls patch it in place so node ids (and the view's expansion state)
    /// survive.
    pub fn update(&mut self, files: Vec<FileEntry>) -> ModelResult<()> {
        let incoming: BTreeMap<usize, FileEntry> = files.into_iter().map(|f| (f.index, f)).collect();
        if incoming == self.files {
            return Ok(());
        }
        if self.files.is_empty() {
            return self.build(incoming);
        }

        let same_paths = incoming.len() == self.files.len()
            && incoming
                .iter()
                .all(|(index, f)| self.files.get(index).map(|old| old.path == f.path).unwrap_or(false));
        if same_paths {
            self.update_sizes(incoming);
            return Ok(());
        }
        self.patch(incoming)
    }

    fn build(&mut self, files: BTreeMap<usize, FileEntry>) -> ModelResult<()> {
        validate_paths(files.values().map(|f| f.path.as_str()))?;

        let mut sorted: Vec<&FileEntry> = files.values().collect();
        sorted.sort_by(|a, b| split_path(&a.path).cmp(&split_path(&b.path)));

        // Component order keeps every path next to the paths below it, so
        // only the most recently attached sibling can clash.
        let mut stack: Vec<(&str, NodeId)> = Vec::new();
        self.clear_nodes();
        for entry in &sorted {
            let parts = split_path(&entry.path);
            let Some((leaf, dirs)) = parts.split_last() else {
                continue;
            };
            let common = stack
                .iter()
                .zip(dirs.iter())
                .take_while(|((open, _), dir)| open == *dir)
                .count();
            stack.truncate(common);
            for dir in &dirs[common..] {
                let parent = stack.last().map(|(_, id)| *id).unwrap_or(NodeId::ROOT);
                self.check_last_sibling(parent, dir)?;
                let id = self.alloc(Node::dir(dir, parent));
                self.push_child(parent, id);
                stack.push((*dir, id));
            }
            let parent = stack.last().map(|(_, id)| *id).unwrap_or(NodeId::ROOT);
            self.check_last_sibling(parent, leaf)?;
            let id = self.alloc(Node::file(leaf, parent, entry.index));
            self.push_child(parent, id);
            self.file_nodes.insert(entry.index, id);
        }
        self.files = files;

        let dirs: Vec<NodeId> = std::iter::once(NodeId::ROOT).chain(self.directories()).collect();
        for dir in dirs {
            self.order_children(dir);
        }
        self.remap_persistent();
        info!(files = self.files.len(), nodes = self.nodes.len(), "file tree built");
        self.signals.emit(ModelSignal::ModelReset);
        self.assert_invariants();
        Ok(())
    }

    fn check_last_sibling(&self, parent: NodeId, name: &str) -> ModelResult<()> {
        let last = self.children(parent).last().and_then(|&c| self.name(c));
        if last == Some(name) {
            return Err(ModelError::invariant(format!("duplicate sibling `{}`", name)));
        }
        Ok(())
    }

    fn clear_nodes(&mut self) {
        self.nodes.retain(|&id, _| id == NodeId::ROOT);
        if let Some(root) = self.nodes.get_mut(&NodeId::ROOT) {
            root.children.clear();
        }
        self.file_nodes.clear();
    }

    fn update_sizes(&mut self, incoming: BTreeMap<usize, FileEntry>) {
        let changed: Vec<usize> = incoming
            .iter()
            .filter(|(index, f)| self.files.get(index).map(|old| old.size != f.size).unwrap_or(false))
            .map(|(index, _)| *index)
            .collect();
        self.files = incoming;
        self.resort_for(&changed, &["size"]);
        self.announce_files_changed(&changed, &["size"]);
    }

    fn patch(&mut self, incoming: BTreeMap<usize, FileEntry>) -> ModelResult<()> {
        validate_paths(incoming.values().map(|f| f.path.as_str()))?;

        self.signals.emit(ModelSignal::LayoutAboutToBeChanged);

        let removed: Vec<usize> = self
            .files
            .keys()
            .filter(|index| !incoming.contains_key(index))
            .copied()
            .collect();
        let moved: Vec<usize> = incoming
            .iter()
            .filter(|(index, f)| self.files.get(index).map(|old| old.path != f.path).unwrap_or(false))
            .map(|(index, _)| *index)
            .collect();
        let added: Vec<usize> = incoming
            .keys()
            .filter(|index| !self.files.contains_key(index))
            .copied()
            .collect();

        let mut vacated = Vec::new();
        let mut touched = Vec::new();
        for index in removed.iter().chain(moved.iter()) {
            if let Some(node) = self.file_nodes.get(index).copied() {
                if let Some(parent) = self.parent(node) {
                    touched.extend(self.chain(parent));
                }
                if let Some(parent) = self.detach(node) {
                    vacated.push(parent);
                }
            }
        }
        for index in &removed {
            if let Some(node) = self.file_nodes.remove(index) {
                self.nodes.remove(&node);
            }
        }

        let mut created = Vec::new();
        for index in moved.iter().chain(added.iter()) {
            let Some(entry) = incoming.get(index) else {
                continue;
            };
            let parts = split_path(&entry.path);
            let Some((leaf, dirs)) = parts.split_last() else {
                continue;
            };
            let parent = self.ensure_dirs(dirs, &mut created)?;
            let node = match self.file_nodes.get(index).copied() {
                Some(node) => {
                    if let Some(n) = self.nodes.get_mut(&node) {
                        n.name = leaf.to_string();
                    }
                    node
                }
                None => {
                    let node = self.alloc(Node::file(leaf, parent, *index));
                    self.file_nodes.insert(*index, node);
                    node
                }
            };
            self.attach(node, parent);
            touched.extend(self.chain(parent));
        }

        for dir in vacated {
            self.prune(dir);
        }
        self.files = incoming;
        // Aggregates are final only once every leaf is attached.
        self.reorder(touched);
        self.remap_persistent();
        debug!(
            added = added.len(),
            removed = removed.len(),
            moved = moved.len(),
            "file tree patched"
        );
        self.signals.emit(ModelSignal::LayoutChanged);
        if !created.is_empty() {
            self.signals.emit(ModelSignal::NodesCreated(created));
        }
        self.assert_invariants();
        Ok(())
    }

    /// Move file `index` to `new_path`, creating and pruning directories as
    /// needed. Renaming to the current path does nothing.
    pub fn rename(&mut self, index: usize, new_path: &str) -> ModelResult<()> {
        let Some(current) = self.files.get(&index) else {
            return Err(ModelError::invariant(format!("no file with index {}", index)));
        };
        if current.path == new_path {
            return Ok(());
        }
        validate_paths(self.files.values().map(|f| {
            if f.index == index {
                new_path
            } else {
                f.path.as_str()
            }
        }))?;

        self.signals.emit(ModelSignal::LayoutAboutToBeChanged);
        let mut created = Vec::new();
        let mut touched = Vec::new();
        self.move_file(index, new_path, &mut created, &mut touched)?;
        self.reorder(touched);
        self.remap_persistent();
        self.signals.emit(ModelSignal::LayoutChanged);
        if !created.is_empty() {
            self.signals.emit(ModelSignal::NodesCreated(created));
        }
        self.assert_invariants();
        Ok(())
    }

    /// Rename the folder `old_path` to `new_path`.
    ///
    /// A missing target moves the directory node itself, keeping its id. An
    /// existing target directory receives the contents file by file.
    pub fn rename_folder(&mut self, old_path: &str, new_path: &str) -> ModelResult<()> {
        let old_path = old_path.trim_end_matches(SEPARATOR);
        let new_path = new_path.trim_end_matches(SEPARATOR);
        if old_path == new_path {
            return Ok(());
        }
        let source = match self.find(old_path) {
            Some(node) if node != NodeId::ROOT && !self.is_file(node) => node,
            _ => return Err(ModelError::invariant(format!("no folder `{}`", old_path))),
        };
        if new_path.is_empty() {
            return Err(ModelError::invariant("folder cannot be renamed to the root"));
        }
        if new_path.starts_with(&format!("{}{}", old_path, SEPARATOR)) {
            return Err(ModelError::invariant(format!(
                "`{}` is inside `{}`",
                new_path, old_path
            )));
        }
        let target = self.find(new_path);
        if target.map(|t| self.is_file(t)).unwrap_or(false) {
            return Err(ModelError::invariant(format!("`{}` is a file", new_path)));
        }

        let moves: Vec<(usize, String)> = self
            .leaves(source)
            .into_iter()
            .filter_map(|index| {
                let path = &self.files.get(&index)?.path;
                let suffix = path.strip_prefix(old_path)?;
                Some((index, format!("{}{}", new_path, suffix)))
            })
            .collect();
        let renamed: HashMap<usize, &str> = moves.iter().map(|(i, p)| (*i, p.as_str())).collect();
        validate_paths(
            self.files
                .values()
                .map(|f| renamed.get(&f.index).copied().unwrap_or(f.path.as_str())),
        )?;

        self.signals.emit(ModelSignal::LayoutAboutToBeChanged);
        let mut created = Vec::new();
        let mut touched = Vec::new();
        match target {
            Some(_) => {
                for (index, path) in &moves {
                    self.move_file(*index, path, &mut created, &mut touched)?;
                }
            }
            None => {
                let parts = split_path(new_path);
                let Some((leaf, dirs)) = parts.split_last() else {
                    return Err(ModelError::invariant("empty folder target"));
                };
                if let Some(parent) = self.parent(source) {
                    touched.extend(self.chain(parent));
                }
                let old_parent = self.detach(source);
                let parent = self.ensure_dirs(dirs, &mut created)?;
                if let Some(n) = self.nodes.get_mut(&source) {
                    n.name = leaf.to_string();
                }
                self.attach(source, parent);
                touched.extend(self.chain(parent));
                if let Some(dir) = old_parent {
                    self.prune(dir);
                }
                for (index, path) in moves {
                    if let Some(entry) = self.files.get_mut(&index) {
                        entry.path = path;
                    }
                }
            }
        }
        self.reorder(touched);
        self.remap_persistent();
        info!(from = old_path, to = new_path, "folder renamed");
        self.signals.emit(ModelSignal::LayoutChanged);
        if !created.is_empty() {
            self.signals.emit(ModelSignal::NodesCreated(created));
        }
        self.assert_invariants();
        Ok(())
    }

    /// Relink file `index` at `new_path`. The folder chains it left and
    /// joined are added to `touched`; sorting them is up to the caller.
    fn move_file(
        &mut self,
        index: usize,
        new_path: &str,
        created: &mut Vec<NodeId>,
        touched: &mut Vec<NodeId>,
    ) -> ModelResult<()> {
        let Some(node) = self.file_nodes.get(&index).copied() else {
            return Err(ModelError::invariant(format!("no node for file {}", index)));
        };
        let parts = split_path(new_path);
        let Some((leaf, dirs)) = parts.split_last() else {
            return Err(ModelError::invariant("empty file path"));
        };
        if let Some(parent) = self.parent(node) {
            touched.extend(self.chain(parent));
        }
        let old_parent = self.detach(node);
        let parent = self.ensure_dirs(dirs, created)?;
        if let Some(n) = self.nodes.get_mut(&node) {
            n.name = leaf.to_string();
        }
        self.attach(node, parent);
        touched.extend(self.chain(parent));
        if let Some(dir) = old_parent {
            self.prune(dir);
        }
        if let Some(entry) = self.files.get_mut(&index) {
            entry.path = new_path.to_string();
        }
        Ok(())
    }

    /// Walk `dirs` from the root, creating what is missing.
    fn ensure_dirs(&mut self, dirs: &[&str], created: &mut Vec<NodeId>) -> ModelResult<NodeId> {
        let mut current = NodeId::ROOT;
        for dir in dirs {
            current = match self.child_named(current, dir) {
                Some(existing) if self.is_file(existing) => {
                    return Err(ModelError::invariant(format!("`{}` is a file", dir)));
                }
                Some(existing) => existing,
                None => {
                    let id = self.alloc(Node::dir(dir, current));
                    self.attach(id, current);
                    created.push(id);
                    id
                }
            };
        }
        Ok(current)
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(child);
        }
    }

    fn attach(&mut self, node: NodeId, parent: NodeId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(parent);
        }
        if let Some(p) = self.nodes.get_mut(&parent) {
            if !p.children.contains(&node) {
                p.children.push(node);
            }
        }
    }

    /// Unlink `node` from its parent and return the former parent.
    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&node)?.parent.take()?;
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|&c| c != node);
        }
        Some(parent)
    }

    /// Remove `dir` and then each ancestor that became empty, stopping at
    /// the root.
    fn prune(&mut self, dir: NodeId) {
        let mut current = dir;
        while current != NodeId::ROOT {
            let empty = self
                .nodes
                .get(&current)
                .map(|n| n.file.is_none() && n.children.is_empty())
                .unwrap_or(false);
            if !empty {
                break;
            }
            let parent = self.detach(current);
            self.nodes.remove(&current);
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
    }

    /// Children of `dir` in the order the active sort gives them.
    fn sorted_children(&self, dir: NodeId) -> Vec<NodeId> {
        let children = self.children(dir).to_vec();
        if children.len() < 2 {
            return children;
        }
        match self.sort.and_then(|s| self.columns.get(s.column).map(|c| (c, s.descending))) {
            Some((column, descending)) => {
                match sort_by_column(&children, column, descending, |id| column.sort_key(&self.item(*id))) {
                    Ok(sorted) => sorted,
                    Err(e) => {
                        warn!(column = column.name(), "keeping current order: {}", e);
                        children
                    }
                }
            }
            None => {
                let mut named: Vec<(NaturalKey, NodeId)> = children
                    .iter()
                    .map(|&id| (NaturalKey::new(self.name(id).unwrap_or_default()), id))
                    .collect();
                named.sort_by(|a, b| a.0.cmp(&b.0));
                named.into_iter().map(|(_, id)| id).collect()
            }
        }
    }

    fn order_children(&mut self, dir: NodeId) {
        let sorted = self.sorted_children(dir);
        if let Some(n) = self.nodes.get_mut(&dir) {
            n.children = sorted;
        }
    }

    /// `dir` followed by each of its ancestors up to and including the root.
    fn chain(&self, dir: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = Some(dir);
        while let Some(id) = current {
            if !self.nodes.contains_key(&id) {
                break;
            }
            out.push(id);
            current = self.parent(id);
        }
        out
    }

    /// New child orders for the directories in `dirs` whose order moved.
    /// Directories that no longer exist are skipped, each one is sorted once.
    fn plan_reorder<I>(&self, dirs: I) -> Vec<(NodeId, Vec<NodeId>)>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut seen = BTreeSet::new();
        dirs.into_iter()
            .filter(|dir| seen.insert(*dir))
            .filter(|dir| self.nodes.contains_key(dir) && !self.is_file(*dir))
            .filter_map(|dir| {
                let sorted = self.sorted_children(dir);
                (sorted.as_slice() != self.children(dir)).then_some((dir, sorted))
            })
            .collect()
    }

    fn apply_reorder(&mut self, plan: Vec<(NodeId, Vec<NodeId>)>) {
        for (dir, sorted) in plan {
            if let Some(n) = self.nodes.get_mut(&dir) {
                n.children = sorted;
            }
        }
    }

    /// Re-sort every directory in `dirs`, bottom up as given.
    fn reorder(&mut self, dirs: Vec<NodeId>) {
        let plan = self.plan_reorder(dirs);
        self.apply_reorder(plan);
    }

    /// Whether the active sort reads any of `fields`.
    fn sort_reads(&self, fields: &[&str]) -> bool {
        let Some(column) = self.sort.and_then(|s| self.columns.get(s.column)) else {
            return false;
        };
        column
            .sorter()
            .or_else(|| column.projection(Role::Display))
            .map(|p| p.fields().iter().any(|f| fields.contains(&f.as_str())))
            .unwrap_or(false)
    }

    /// After a data-only change to files `indices`, re-sort the folders
    /// above them if the sort column reads a changed field. A layout change
    /// is emitted only when some order actually moves.
    fn resort_for(&mut self, indices: &[usize], fields: &[&str]) {
        if indices.is_empty() || !self.sort_reads(fields) {
            return;
        }
        let dirs: Vec<NodeId> = indices
            .iter()
            .filter_map(|i| self.file_nodes.get(i).copied())
            .filter_map(|node| self.parent(node))
            .flat_map(|parent| self.chain(parent))
            .collect();
        let plan = self.plan_reorder(dirs);
        if plan.is_empty() {
            return;
        }
        debug!(folders = plan.len(), "file tree re-sorted after a data change");
        self.signals.emit(ModelSignal::LayoutAboutToBeChanged);
        self.apply_reorder(plan);
        self.remap_persistent();
        self.signals.emit(ModelSignal::LayoutChanged);
    }

    /// Sort every level by `column`. Always re-lays out.
    pub fn sort(&mut self, column: usize, order: SortOrder) {
        if column >= self.columns.len() {
            warn!(column, "sort requested on unknown column");
            return;
        }
        self.sort = Some(SortSpec::new(column, order));
        self.signals.emit(ModelSignal::LayoutAboutToBeChanged);
        let dirs: Vec<NodeId> = std::iter::once(NodeId::ROOT).chain(self.directories()).collect();
        for dir in dirs {
            self.order_children(dir);
        }
        self.remap_persistent();
        self.signals.emit(ModelSignal::LayoutChanged);
    }

    /// Per-poll refresh of file progress (fractions) and priorities, both
    /// indexed by file index.
    pub fn set_file_status(&mut self, progress: Vec<f64>, priorities: Vec<i64>) {
        let len = progress.len().max(self.progress.len());
        let mut changed: BTreeSet<usize> = (0..len)
            .filter(|&i| progress.get(i) != self.progress.get(i))
            .collect();
        let len = priorities.len().max(self.priorities.len());
        changed.extend((0..len).filter(|&i| priorities.get(i) != self.priorities.get(i)));
        self.progress = progress;
        self.priorities = priorities;
        let changed: Vec<usize> = changed.into_iter().collect();
        let fields = ["progress", "priority", "check_state"];
        self.resort_for(&changed, &fields);
        self.announce_files_changed(&changed, &fields);
    }

    /// Optimistically set `priority` on `node` (every file below it for a
    /// folder) and return the `(index, priority)` pairs to send.
    pub fn set_priority(&mut self, node: NodeId, priority: i64) -> ModelResult<Vec<(usize, i64)>> {
        if node == NodeId::ROOT || !self.nodes.contains_key(&node) {
            return Err(ModelError::invariant(format!("unknown node {:?}", node)));
        }
        let indices = self.leaves(node);
        for &index in &indices {
            if self.priorities.len() <= index {
                self.priorities.resize(index + 1, DEFAULT_PRIORITY);
            }
            self.priorities[index] = priority;
        }
        self.resort_for(&indices, &["priority", "check_state"]);
        self.announce_files_changed(&indices, &["priority", "check_state"]);
        Ok(indices.into_iter().map(|i| (i, priority)).collect())
    }

    /// Rename `node` in place (same parent) and describe the change for the
    /// daemon. `new_name` may itself contain separators.
    pub fn request_rename(&mut self, node: NodeId, new_name: &str) -> ModelResult<RenameIntent> {
        let new_name = new_name.trim_matches(SEPARATOR);
        if new_name.is_empty() {
            return Err(ModelError::invariant("empty name"));
        }
        let parent = self
            .parent(node)
            .ok_or_else(|| ModelError::invariant(format!("cannot rename {:?}", node)))?;
        let parent_path = self.path(parent).unwrap_or_default();
        let new_path = if parent_path.is_empty() {
            new_name.to_string()
        } else {
            format!("{}{}{}", parent_path, SEPARATOR, new_name)
        };
        match self.file_index(node) {
            Some(index) => {
                self.rename(index, &new_path)?;
                Ok(RenameIntent::File { index, new_path })
            }
            None => {
                let old_path = self
                    .path(node)
                    .ok_or_else(|| ModelError::invariant(format!("unknown node {:?}", node)))?;
                self.rename_folder(&old_path, &new_path)?;
                Ok(RenameIntent::Folder { old_path, new_path })
            }
        }
    }

    /// Emit cells-changed for every directory level holding an affected
    /// file or an ancestor of one.
    fn announce_files_changed(&mut self, indices: &[usize], fields: &[&str]) {
        let columns = columns_for_fields(&self.columns, fields.iter().copied());
        let (Some(&left), Some(&right)) = (columns.first(), columns.last()) else {
            return;
        };
        let mut rows_by_parent: BTreeMap<NodeId, (usize, usize)> = BTreeMap::new();
        for index in indices {
            let Some(mut current) = self.file_nodes.get(index).copied() else {
                continue;
            };
            while let (Some(parent), Some(row)) = (self.parent(current), self.row(current)) {
                let span = rows_by_parent.entry(parent).or_insert((row, row));
                span.0 = span.0.min(row);
                span.1 = span.1.max(row);
                current = parent;
            }
        }
        for (parent, (first, last)) in rows_by_parent {
            self.signals.emit(ModelSignal::DataChanged {
                parent: (parent != NodeId::ROOT).then_some(parent),
                rows: first..=last,
                columns: left..=right,
            });
        }
    }

    pub fn clear(&mut self) {
        self.clear_nodes();
        self.files.clear();
        self.progress.clear();
        self.priorities.clear();
        self.persistent.invalidate_all();
        self.signals.emit(ModelSignal::ModelReset);
    }

    pub fn persistent_index(&mut self, node: NodeId, column: usize) -> Option<PersistentRef> {
        let row = self.row(node)?;
        Some(self.persistent.register(node, row, column))
    }

    pub fn persistent_row(&self, handle: PersistentRef) -> Option<usize> {
        self.persistent.row(handle)
    }

    pub fn persistent_node(&self, handle: PersistentRef) -> Option<NodeId> {
        self.persistent.key(handle).copied()
    }

    pub fn release(&mut self, handle: PersistentRef) {
        self.persistent.release(handle);
    }

    pub fn drain_signals(&mut self) -> Vec<ModelSignal> {
        self.signals.drain()
    }

    fn remap_persistent(&mut self) {
        let nodes = &self.nodes;
        self.persistent.remap(|id| row_in(nodes, *id));
    }

    fn assert_invariants(&self) {
        if cfg!(debug_assertions) {
            if let Err(e) = self.check_invariants() {
                panic!("{}", e);
            }
        }
    }

    /// Structural self-check: links agree both ways, every file path
    /// matches its ancestor chain, no empty directory except the root, and
    /// sibling names are unique.
    pub fn check_invariants(&self) -> ModelResult<()> {
        let mut reachable = 0usize;
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            reachable += 1;
            let node = self
                .nodes
                .get(&id)
                .ok_or_else(|| ModelError::invariant(format!("dangling child {:?}", id)))?;
            if id != NodeId::ROOT && node.file.is_none() && node.children.is_empty() {
                return Err(ModelError::invariant(format!("empty directory {:?}", id)));
            }
            if node.file.is_some() && !node.children.is_empty() {
                return Err(ModelError::invariant(format!("file {:?} has children", id)));
            }
            let mut names = BTreeSet::new();
            for &child in &node.children {
                let c = self
                    .nodes
                    .get(&child)
                    .ok_or_else(|| ModelError::invariant(format!("dangling child {:?}", child)))?;
                if c.parent != Some(id) {
                    return Err(ModelError::invariant(format!("{:?} disowns its parent", child)));
                }
                if !names.insert(c.name.as_str()) {
                    return Err(ModelError::invariant(format!("duplicate sibling `{}`", c.name)));
                }
                stack.push(child);
            }
        }
        if reachable != self.nodes.len() {
            return Err(ModelError::invariant(format!(
                "{} nodes unreachable from the root",
                self.nodes.len() - reachable
            )));
        }
        if self.file_nodes.len() != self.files.len() {
            return Err(ModelError::invariant("file index and node map disagree"));
        }
        for (index, entry) in &self.files {
            let node = self
                .file_node(*index)
                .ok_or_else(|| ModelError::invariant(format!("file {} has no node", index)))?;
            if self.file_index(node) != Some(*index) {
                return Err(ModelError::invariant(format!("node for file {} is mislabelled", index)));
            }
            if self.path(node).as_deref() != Some(entry.path.as_str()) {
                return Err(ModelError::invariant(format!(
                    "path of file {} does not match its ancestors",
                    index
                )));
            }
        }
        Ok(())
    }
}

impl KeyedModel for FileTree {
    type Key = NodeId;

    fn position_of(&self, key: &NodeId) -> Option<usize> {
        self.row(*key)
    }

    fn persistent_index(&mut self, key: &NodeId, column: usize) -> Option<PersistentRef> {
        FileTree::persistent_index(self, *key, column)
    }

    fn persistent_key(&self, handle: PersistentRef) -> Option<NodeId> {
        self.persistent_node(handle)
    }

    fn persistent_row(&self, handle: PersistentRef) -> Option<usize> {
        self.persistent.row(handle)
    }

    fn release(&mut self, handle: PersistentRef) {
        self.persistent.release(handle);
    }
}

/// A node seen through the field interface projections read from.
struct TreeItem<'a> {
    tree: &'a FileTree,
    node: NodeId,
}

impl FieldSource for TreeItem<'_> {
    fn field(&self, name: &str) -> Option<Cow<'_, Value>> {
        let tree = self.tree;
        let node = tree.nodes.get(&self.node)?;
        let value = match name {
            "name" => Value::Str(node.name.clone()),
            "index" => node.file.map(Value::from).unwrap_or(Value::Null),
            "size" => {
                let total: u64 = tree
                    .leaves(self.node)
                    .iter()
                    .filter_map(|i| tree.files.get(i))
                    .map(|f| f.size)
                    .sum();
                Value::from(total)
            }
            "progress" => {
                let leaves = tree.leaves(self.node);
                if leaves.is_empty() {
                    return None;
                }
                let sizes: Vec<u64> = leaves
                    .iter()
                    .map(|i| tree.files.get(i).map(|f| f.size).unwrap_or(0))
                    .collect();
                let total: u64 = sizes.iter().sum();
                let mean = if total > 0 {
                    leaves
                        .iter()
                        .zip(&sizes)
                        .map(|(&i, &s)| tree.progress_of(i) * s as f64)
                        .sum::<f64>()
                        / total as f64
                } else {
                    leaves.iter().map(|&i| tree.progress_of(i)).sum::<f64>() / leaves.len() as f64
                };
                Value::Float(mean)
            }
            "priority" => {
                let leaves = tree.leaves(self.node);
                let mut priorities = leaves.iter().map(|&i| tree.priority_of(i));
                let first = priorities.next()?;
                if priorities.all(|p| p == first) {
                    Value::Int(first)
                } else {
                    Value::Null
                }
            }
            "check_state" => match tree.check_state(self.node)? {
                CheckState::Unchecked => Value::Int(0),
                CheckState::PartiallyChecked => Value::Int(1),
                CheckState::Checked => Value::Int(2),
            },
            _ => return None,
        };
        Some(Cow::Owned(value))
    }
}
