use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::{ListState, TableState};
use swarmview_core::columns::IconResolver;
use swarmview_core::projection::Icon;
use swarmview_core::{Client, NodeId, StateDirSession, TickReport};

use crate::settings::SettingsForm;

/// Which pane receives navigation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Filters,
    Torrents,
    Detail,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Filters => Focus::Torrents,
            Focus::Torrents => Focus::Detail,
            Focus::Detail => Focus::Filters,
        }
    }

    fn previous(self) -> Self {
        match self {
            Focus::Filters => Focus::Detail,
            Focus::Torrents => Focus::Filters,
            Focus::Detail => Focus::Torrents,
        }
    }
}

/// Tabs of the lower pane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailTab {
    Details,
    Files,
    Peers,
    Settings,
}

impl DetailTab {
    pub const ALL: [DetailTab; 4] = [DetailTab::Details, DetailTab::Files, DetailTab::Peers, DetailTab::Settings];

    pub fn title(self) -> &'static str {
        match self {
            DetailTab::Details => "Details",
            DetailTab::Files => "Files",
            DetailTab::Peers => "Peers",
            DetailTab::Settings => "Settings",
        }
    }

    pub fn index(self) -> usize {
        match self {
            DetailTab::Details => 0,
            DetailTab::Files => 1,
            DetailTab::Peers => 2,
            DetailTab::Settings => 3,
        }
    }
}

/// Terminal glyphs in place of the daemon's icon names
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphIcons;

impl IconResolver for GlyphIcons {
    fn state_icon(&self, state: &str) -> Option<Icon> {
        let glyph = match state {
            "Allocating" | "Checking" => "⟳",
            "Downloading" => "↓",
            "Seeding" => "↑",
            "Paused" => "‖",
            "Error" => "!",
            "Queued" => "…",
            _ => return None,
        };
        Some(Icon::named(glyph))
    }

    fn tracker_icon(&self, _host: &str) -> Option<Icon> {
        None
    }

    fn flag_icon(&self, country: &str) -> Option<Icon> {
        (!country.is_empty()).then(|| Icon::named(country.to_uppercase()))
    }
}

/// Work that has to go through the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ToggleFile(NodeId),
    RenameFile(NodeId, String),
    RemoveSelected { remove_data: bool },
}

/// An in-progress rename in the file pane
#[derive(Debug, Clone)]
pub struct RenameEdit {
    pub node: NodeId,
    pub buffer: String,
}

pub struct App {
    pub client: Client<StateDirSession>,
    pub focus: Focus,
    pub tab: DetailTab,
    pub torrent_state: TableState,
    pub filter_state: ListState,
    pub file_state: TableState,
    pub peer_state: TableState,
    /// Node under the file cursor; rows move under it as the tree changes.
    file_cursor: Option<NodeId>,
    peer_cursor: Option<String>,
    /// Position among the visible torrent columns that `s` sorts by
    pub sort_cursor: usize,
    pub rename: Option<RenameEdit>,
    pub settings: SettingsForm,
    pub last_report: TickReport,
    pub last_message: Option<String>,
    pub message_timeout: Option<DateTime<Utc>>,
    pub should_quit: bool,
}

impl App {
    pub fn new(client: Client<StateDirSession>) -> Result<Self> {
        let settings = SettingsForm::new(client.config())?;
        let mut app = Self {
            client,
            focus: Focus::Torrents,
            tab: DetailTab::Details,
            torrent_state: TableState::default(),
            filter_state: ListState::default(),
            file_state: TableState::default(),
            peer_state: TableState::default(),
            file_cursor: None,
            peer_cursor: None,
            sort_cursor: 0,
            rename: None,
            settings,
            last_report: TickReport::default(),
            last_message: None,
            message_timeout: None,
            should_quit: false,
        };
        app.sync_visibility();
        Ok(app)
    }

    pub async fn refresh(&mut self) {
        self.last_report = self.client.tick().await;
        // Nothing here redraws incrementally; the next frame reads the models.
        let relaid = self.client.drain_signals().iter().any(|(_, signal)| signal.is_layout_change());
        if relaid {
            self.drop_stale_rename();
        }
        self.sync_cursors();
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.last_message = Some(message.into());
        self.message_timeout = Some(Utc::now() + chrono::Duration::seconds(5));
    }

    /// Drop the status message once it has been shown long enough.
    pub fn expire_message(&mut self) {
        if let Some(timeout) = self.message_timeout {
            if Utc::now() > timeout {
                self.last_message = None;
                self.message_timeout = None;
            }
        }
    }

    /// Only the visible tab polls the daemon.
    fn sync_visibility(&mut self) {
        self.client.details_mut().set_visible(self.tab == DetailTab::Details);
        self.client.files_mut().set_visible(self.tab == DetailTab::Files);
        self.client.peers_mut().set_visible(self.tab == DetailTab::Peers);
    }

    fn select_tab(&mut self, tab: DetailTab) {
        if self.tab != tab {
            self.tab = tab;
            self.sync_visibility();
        }
    }

    /// Abandon an edit whose node went away with the last layout change.
    fn drop_stale_rename(&mut self) {
        let Some(edit) = &self.rename else {
            return;
        };
        let alive = self.client.files().current().map(|tree| tree.contains(edit.node)).unwrap_or(false);
        if !alive {
            self.rename = None;
            self.set_message("File changed while renaming; edit dropped");
        }
    }

    /// Point the widgets' cursors at what the models consider current.
    pub fn sync_cursors(&mut self) {
        self.torrent_state.select(self.client.torrents().current_row());
        self.filter_state.select(self.client.filters().selected_row());

        let files = self.file_keys();
        follow_cursor(&mut self.file_state, &files, &mut self.file_cursor);
        let peers = self.client.peers().model().order().to_vec();
        follow_cursor(&mut self.peer_state, &peers, &mut self.peer_cursor);

        let columns = self.client.torrents().visible_columns().len();
        self.sort_cursor = self.sort_cursor.min(columns.saturating_sub(1));
    }

    fn file_keys(&self) -> Vec<NodeId> {
        self.client.files().visible_nodes().into_iter().map(|(node, _)| node).collect()
    }

    pub fn current_file(&self) -> Option<NodeId> {
        let node = self.file_cursor?;
        self.file_keys().contains(&node).then_some(node)
    }

    /// Apply a key press. Returns the session work it asks for, if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Intent> {
        if self.rename.is_some() {
            return self.handle_rename_key(key);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return None;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::BackTab => self.focus = self.focus.previous(),
            KeyCode::Char('1') => self.select_tab(DetailTab::Details),
            KeyCode::Char('2') => self.select_tab(DetailTab::Files),
            KeyCode::Char('3') => self.select_tab(DetailTab::Peers),
            KeyCode::Char('4') => self.select_tab(DetailTab::Settings),
            KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') if self.editing_settings() => {
                self.adjust_setting(if key.code == KeyCode::Left { -1 } else { 1 });
            }
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::PageUp => self.move_cursor(-10),
            KeyCode::PageDown => self.move_cursor(10),
            KeyCode::Left if self.focus == Focus::Torrents => {
                self.sort_cursor = self.sort_cursor.saturating_sub(1);
            }
            KeyCode::Right if self.focus == Focus::Torrents => {
                let columns = self.client.torrents().visible_columns().len();
                self.sort_cursor = (self.sort_cursor + 1).min(columns.saturating_sub(1));
            }
            KeyCode::Char('s') => {
                if let Some(&column) = self.client.torrents().visible_columns().get(self.sort_cursor) {
                    self.client.torrents_mut().toggle_sort(column);
                    self.sync_cursors();
                }
            }
            KeyCode::Char(' ') => return self.toggle_under_cursor(),
            KeyCode::Enter => self.expand_under_cursor(),
            KeyCode::Char('r') if self.focus == Focus::Detail && self.tab == DetailTab::Files => {
                self.start_rename();
            }
            KeyCode::Char('x') if self.focus == Focus::Torrents => {
                return Some(Intent::RemoveSelected { remove_data: false });
            }
            KeyCode::Char('X') if self.focus == Focus::Torrents => {
                return Some(Intent::RemoveSelected { remove_data: true });
            }
            _ => {}
        }
        None
    }

    fn handle_rename_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Esc => self.rename = None,
            KeyCode::Enter => {
                let edit = self.rename.take()?;
                if !edit.buffer.is_empty() {
                    return Some(Intent::RenameFile(edit.node, edit.buffer));
                }
            }
            KeyCode::Backspace => {
                if let Some(edit) = self.rename.as_mut() {
                    edit.buffer.pop();
                }
            }
            // Names only; moving a file between folders is not a rename here.
            KeyCode::Char(c) if c != '/' => {
                if let Some(edit) = self.rename.as_mut() {
                    edit.buffer.push(c);
                }
            }
            _ => {}
        }
        None
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.focus {
            Focus::Filters => self.move_filter(delta.signum()),
            Focus::Torrents => {
                self.client.move_selection(delta);
                self.sync_cursors();
            }
            Focus::Detail => match self.tab {
                DetailTab::Files => {
                    let keys = self.file_keys();
                    step_cursor(&mut self.file_state, keys.len(), delta);
                    self.file_cursor = self.file_state.selected().and_then(|row| keys.get(row).copied());
                }
                DetailTab::Peers => {
                    let keys = self.client.peers().model().order().to_vec();
                    step_cursor(&mut self.peer_state, keys.len(), delta);
                    self.peer_cursor = self.peer_state.selected().and_then(|row| keys.get(row).cloned());
                }
                DetailTab::Settings => self.settings.move_cursor(delta.signum()),
                DetailTab::Details => {}
            },
        }
    }

    fn editing_settings(&self) -> bool {
        self.focus == Focus::Detail && self.tab == DetailTab::Settings
    }

    /// Change the preference under the cursor and hand it to the client.
    fn adjust_setting(&mut self, delta: isize) {
        self.settings.adjust(delta);
        match self.settings.apply(self.client.config()) {
            Ok(config) => self.client.set_config(config),
            Err(e) => {
                self.set_message(format!("❌ {:#}", e));
                if let Err(e) = self.settings.load(self.client.config()) {
                    self.set_message(format!("❌ {:#}", e));
                }
            }
        }
    }

    /// Step to the next selectable sidebar row, skipping category headings.
    fn move_filter(&mut self, step: isize) {
        let rows = self.client.filters().rows().len();
        let mut row = self.client.filters().selected_row().unwrap_or(0);
        loop {
            row = match row.checked_add_signed(step) {
                Some(next) if next < rows => next,
                _ => return,
            };
            if self.client.select_filter_row(row) {
                self.filter_state.select(Some(row));
                return;
            }
        }
    }

    fn toggle_under_cursor(&mut self) -> Option<Intent> {
        match self.focus {
            Focus::Torrents => {
                if let Some(row) = self.torrent_state.selected() {
                    self.client.toggle_torrent_row(row);
                }
                None
            }
            Focus::Detail if self.tab == DetailTab::Files => self.current_file().map(Intent::ToggleFile),
            _ => None,
        }
    }

    fn expand_under_cursor(&mut self) {
        if self.focus != Focus::Detail || self.tab != DetailTab::Files {
            return;
        }
        let Some(node) = self.current_file() else {
            return;
        };
        let files = self.client.files();
        let is_folder = files.current().map(|tree| !tree.is_file(node)).unwrap_or(false);
        if is_folder {
            let expanded = files.current_binding().map(|b| b.is_expanded(&node)).unwrap_or(false);
            self.client.files_mut().set_expanded(node, !expanded);
            self.sync_cursors();
        }
    }

    fn start_rename(&mut self) {
        let Some(node) = self.current_file() else {
            return;
        };
        let name = self.client.files().current().and_then(|tree| tree.name(node)).map(str::to_string);
        if let Some(buffer) = name {
            self.rename = Some(RenameEdit { node, buffer });
        }
    }

    pub async fn run_intent(&mut self, intent: Intent) -> Result<()> {
        match intent {
            Intent::ToggleFile(node) => {
                self.client.toggle_file(node).await?;
            }
            Intent::RenameFile(node, name) => {
                if self.client.rename_file(node, &name).await? {
                    self.set_message(format!("Renamed to {}", name));
                }
            }
            Intent::RemoveSelected { remove_data } => {
                let sent = self.client.remove_selected(remove_data).await?;
                self.set_message(format!("Asked the daemon to remove {} torrent(s)", sent));
            }
        }
        self.client.drain_signals();
        self.sync_cursors();
        Ok(())
    }
}

fn clamp_cursor(state: &mut TableState, rows: usize) {
    let selected = match state.selected() {
        _ if rows == 0 => None,
        Some(row) => Some(row.min(rows - 1)),
        None => Some(0),
    };
    state.select(selected);
}

/// Put `state` on the row now holding `tracked`. When that item is gone the
/// cursor stays at its old row, clamped, and follows whatever is there now.
fn follow_cursor<K: Clone + PartialEq>(state: &mut TableState, keys: &[K], tracked: &mut Option<K>) {
    match tracked.as_ref().and_then(|key| keys.iter().position(|k| k == key)) {
        Some(row) => state.select(Some(row)),
        None => {
            clamp_cursor(state, keys.len());
            *tracked = state.selected().and_then(|row| keys.get(row).cloned());
        }
    }
}

fn step_cursor(state: &mut TableState, rows: usize, delta: isize) {
    if rows == 0 {
        state.select(None);
        return;
    }
    let next = state.selected().unwrap_or(0).saturating_add_signed(delta).min(rows - 1);
    state.select(Some(next));
}
