//! One daemon connection as the user sees it: the four panes, the filter
//! sidebar and the poll loop that feeds them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::columns::IconResolver;
use crate::config::ClientConfig;
use crate::error::ModelResult;
use crate::filter::{FilterTree, TRACKER_HOST};
use crate::poll::FetchTicket;
use crate::session::{Command, CommandSink, SessionEvent, SessionProxy, StatusFilter};
use crate::signal::ModelSignal;
use crate::tree::NodeId;
use crate::value::{Record, Snapshot};
use crate::views::{ApplyOutcome, DetailsView, FileTreeView, PeerListView, TorrentListView};

/// Tally of one poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events: usize,
    pub updated: usize,
    pub stale: usize,
    pub failed: usize,
}

impl TickReport {
    fn count(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Stale => self.stale += 1,
            ApplyOutcome::Failed => self.failed += 1,
        }
    }
}

type StatusRequest = Option<(FetchTicket<String>, Vec<String>)>;

async fn fetch_torrents<S: SessionProxy>(
    session: &S,
    request: Option<(FetchTicket<StatusFilter>, Vec<String>)>,
) -> Option<(FetchTicket<StatusFilter>, Result<Snapshot<String>>)> {
    let (ticket, fields) = request?;
    let filter = ticket.subject().cloned().unwrap_or_default();
    let result = session.get_torrents_status(&filter, &fields).await;
    Some((ticket, result))
}

async fn fetch_status<S: SessionProxy>(
    session: &S,
    request: StatusRequest,
) -> Option<(FetchTicket<String>, Result<Record>)> {
    let (ticket, fields) = request?;
    let torrent_id = ticket.subject().cloned()?;
    let result = session.get_torrent_status(&torrent_id, &fields).await;
    Some((ticket, result))
}

pub struct Client<S> {
    session: S,
    config: ClientConfig,
    torrents: TorrentListView,
    peers: PeerListView,
    files: FileTreeView,
    details: DetailsView,
    filters: FilterTree,
}

impl<S> Client<S>
where
    S: SessionProxy + CommandSink + Sync,
{
    pub fn new(session: S, config: ClientConfig, icons: Arc<dyn IconResolver>) -> Self {
        Self {
            torrents: TorrentListView::new(Arc::clone(&icons), &config),
            peers: PeerListView::new(icons, &config),
            files: FileTreeView::new(&config),
            details: DetailsView::new(),
            filters: FilterTree::new(),
            session,
            config,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the preferences. Sidebar options and the poll interval apply
    /// from the next tick; views keep the columns they were built with.
    pub fn set_config(&mut self, config: ClientConfig) {
        if config != self.config {
            info!(poll_interval_ms = config.poll_interval_ms, "preferences changed");
            self.config = config;
        }
    }

    pub fn torrents(&self) -> &TorrentListView {
        &self.torrents
    }

    pub fn torrents_mut(&mut self) -> &mut TorrentListView {
        &mut self.torrents
    }

    pub fn peers(&self) -> &PeerListView {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerListView {
        &mut self.peers
    }

    pub fn files(&self) -> &FileTreeView {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTreeView {
        &mut self.files
    }

    pub fn details(&self) -> &DetailsView {
        &self.details
    }

    pub fn details_mut(&mut self) -> &mut DetailsView {
        &mut self.details
    }

    pub fn filters(&self) -> &FilterTree {
        &self.filters
    }

    pub fn select_torrent_row(&mut self, row: usize) -> bool {
        let selected = self.torrents.select_row(row);
        self.propagate_selection();
        selected
    }

    pub fn toggle_torrent_row(&mut self, row: usize) {
        self.torrents.toggle_row(row);
        self.propagate_selection();
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        let moved = self.torrents.move_selection(delta);
        self.propagate_selection();
        moved
    }

    /// Pick a sidebar row; the torrent list follows its filter.
    pub fn select_filter_row(&mut self, row: usize) -> bool {
        if !self.filters.select_row(row) {
            return false;
        }
        self.torrents.set_filter(self.filters.current_filter());
        true
    }

    fn propagate_selection(&mut self) {
        if let Some(selected) = self.torrents.take_selection_change() {
            self.peers.set_torrent(selected.clone());
            self.files.set_torrent(selected.clone());
            self.details.set_torrent(selected);
        }
    }

    pub fn handle_event(&mut self, event: &SessionEvent) -> ModelResult<()> {
        self.torrents.handle_event(event);
        match event {
            SessionEvent::TorrentFileRenamed {
                torrent_id,
                index,
                new_path,
            } => self.files.on_file_renamed(torrent_id, *index, new_path)?,
            SessionEvent::TorrentFolderRenamed {
                torrent_id,
                old_path,
                new_path,
            } => self.files.on_folder_renamed(torrent_id, old_path, new_path)?,
            SessionEvent::TorrentRemoved { torrent_id } => self.files.on_torrent_removed(torrent_id),
            SessionEvent::SessionPaused => info!("session paused"),
            SessionEvent::SessionResumed => info!("session resumed"),
            SessionEvent::TorrentAdded { .. } | SessionEvent::TorrentStateChanged { .. } => {}
        }
        Ok(())
    }

    async fn refresh_filters(&mut self) {
        let hidden: &[&str] = if self.config.sidebar_show_trackers {
            &[]
        } else {
            &[TRACKER_HOST]
        };
        match self
            .session
            .get_filter_tree(self.config.sidebar_show_zero, hidden)
            .await
        {
            Ok(counts) => {
                if self.filters.update(counts) {
                    self.torrents.set_filter(self.filters.current_filter());
                }
            }
            Err(e) => warn!("Failed to fetch filter counts: {:#}", e),
        }
    }

    /// One poll: drain events, refresh the sidebar, then fetch every view that
    /// may fetch, concurrently. The torrent list lands first so a selection
    /// change turns the dependent fetches of this tick stale.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        match self.session.drain_events().await {
            Ok(events) => {
                report.events = events.len();
                for event in &events {
                    if let Err(e) = self.handle_event(event) {
                        warn!(?event, "event could not be applied: {}", e);
                    }
                }
            }
            Err(e) => warn!("Failed to read daemon events: {:#}", e),
        }
        self.refresh_filters().await;

        let torrent_request = self.torrents.begin_tick().map(|t| (t, self.torrents.required_fields()));
        if torrent_request.is_some() {
            self.torrents.wants_refresh();
        }
        let peer_request = self.peers.begin_tick().map(|t| (t, self.peers.required_fields()));
        let file_request = self.files.begin_tick().map(|t| (t, self.files.required_fields()));
        let detail_request = self.details.begin_tick().map(|t| (t, self.details.required_fields()));

        let session = &self.session;
        let (torrents, peers, files, details) = tokio::join!(
            fetch_torrents(session, torrent_request),
            fetch_status(session, peer_request),
            fetch_status(session, file_request),
            fetch_status(session, detail_request),
        );

        if let Some((ticket, result)) = torrents {
            report.count(self.torrents.apply(ticket, result));
            self.propagate_selection();
        }
        if let Some((ticket, result)) = peers {
            report.count(self.peers.apply(ticket, result));
        }
        if let Some((ticket, result)) = files {
            match self.files.apply(ticket, result) {
                Ok(outcome) => report.count(outcome),
                Err(e) => {
                    warn!("file tree rejected the daemon's file list: {}", e);
                    report.failed += 1;
                }
            }
        }
        if let Some((ticket, result)) = details {
            report.count(self.details.apply(ticket, result));
        }

        debug!(?report, "tick finished");
        report
    }

    /// Whether something changed since the last tick that should not wait
    /// for the next interval.
    pub fn wants_refresh(&mut self) -> bool {
        self.torrents.wants_refresh()
    }

    async fn send_all(&self, commands: Vec<Command>) -> Result<usize> {
        let sent = commands.len();
        for command in commands {
            self.session.send(command).await?;
        }
        Ok(sent)
    }

    /// Rename `node` of the shown torrent. False if no torrent is shown.
    pub async fn rename_file(&mut self, node: NodeId, new_name: &str) -> Result<bool> {
        let command = self.files.rename(node, new_name)?;
        Ok(self.send_all(command.into_iter().collect()).await? > 0)
    }

    pub async fn set_file_priority(&mut self, node: NodeId, priority: i64) -> Result<bool> {
        let command = self.files.set_priority(node, priority)?;
        Ok(self.send_all(command.into_iter().collect()).await? > 0)
    }

    pub async fn toggle_file(&mut self, node: NodeId) -> Result<bool> {
        let command = self.files.toggle_checked(node)?;
        Ok(self.send_all(command.into_iter().collect()).await? > 0)
    }

    /// Ask the daemon to remove every selected torrent. They leave the list
    /// when the next poll no longer reports them.
    pub async fn remove_selected(&mut self, remove_data: bool) -> Result<usize> {
        let commands = self
            .torrents
            .selected_torrents()
            .iter()
            .map(|torrent_id| Command::RemoveTorrent {
                torrent_id: torrent_id.clone(),
                remove_data,
            })
            .collect();
        self.send_all(commands).await
    }

    /// Pending signals of every pane, tagged with the pane they came from.
    pub fn drain_signals(&mut self) -> Vec<(&'static str, ModelSignal)> {
        let mut out = Vec::new();
        out.extend(self.torrents.drain_signals().into_iter().map(|s| ("torrents", s)));
        out.extend(self.peers.drain_signals().into_iter().map(|s| ("peers", s)));
        out.extend(self.files.drain_signals().into_iter().map(|s| ("files", s)));
        out
    }
}

/// Tick `client` every poll interval until `shutdown` resolves, calling
/// `on_tick` after each tick. A pending refresh ticks again right away.
pub async fn run_poll_loop<S, F, H>(client: &mut Client<S>, shutdown: F, mut on_tick: H)
where
    S: SessionProxy + CommandSink + Sync,
    F: Future<Output = ()>,
    H: FnMut(&mut Client<S>, TickReport),
{
    let interval = client.config().poll_interval();
    info!(interval_ms = interval.as_millis() as u64, "poll loop started");
    tokio::pin!(shutdown);
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {
                let report = client.tick().await;
                on_tick(client, report);
                delay = if client.wants_refresh() { Duration::ZERO } else { interval };
            }
        }
    }
    info!("poll loop stopped");
}
