//! Seams to the daemon: status fetches, daemon events and outbound commands.
//!
//! [`StateDirSession`] is the file-based implementation. The daemon dumps one
//! JSON status object per torrent under `<state_dir>/torrents/`, drops events
//! under `<state_dir>/events/`, and picks up command files from the command
//! directory. Command files are written atomically (temp file, then rename)
//! so the daemon never sees a half-written command.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::filter::{count_filters, FilterCounts};
use crate::value::{Record, Snapshot};

/// Field equality filter; `{"state": "Seeding"}`. Empty means everything.
pub type StatusFilter = BTreeMap<String, String>;

/// Read side of the daemon connection.
pub trait SessionProxy {
    /// Status of every torrent matching `filter`, restricted to `fields`
    /// (all fields when `fields` is empty).
    fn get_torrents_status(
        &self,
        filter: &StatusFilter,
        fields: &[String],
    ) -> impl Future<Output = Result<Snapshot<String>>> + Send;

    fn get_torrent_status(
        &self,
        torrent_id: &str,
        fields: &[String],
    ) -> impl Future<Output = Result<Record>> + Send;

    /// Per-category torrent counts for the filter sidebar.
    fn get_filter_tree(
        &self,
        show_zero: bool,
        hidden_categories: &[&str],
    ) -> impl Future<Output = Result<FilterCounts>> + Send;

    /// Take the events the daemon emitted since the last call, oldest first.
    fn drain_events(&self) -> impl Future<Output = Result<Vec<SessionEvent>>> + Send;
}

/// Fire-and-forget write side. Results come back through the next poll.
pub trait CommandSink {
    fn send(&self, command: Command) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Command {
    #[serde(rename = "rename-file")]
    RenameFiles {
        torrent_id: String,
        renames: Vec<(usize, String)>,
    },
    #[serde(rename = "rename-folder")]
    RenameFolder {
        torrent_id: String,
        old_path: String,
        new_path: String,
    },
    #[serde(rename = "set-file-priority")]
    SetFilePriorities {
        torrent_id: String,
        priorities: Vec<(usize, i64)>,
    },
    #[serde(rename = "remove")]
    RemoveTorrent {
        torrent_id: String,
        #[serde(default)]
        remove_data: bool,
    },
}

impl Command {
    pub fn action(&self) -> &'static str {
        match self {
            Command::RenameFiles { .. } => "rename-file",
            Command::RenameFolder { .. } => "rename-folder",
            Command::SetFilePriorities { .. } => "set-file-priority",
            Command::RemoveTorrent { .. } => "remove",
        }
    }

    pub fn torrent_id(&self) -> &str {
        match self {
            Command::RenameFiles { torrent_id, .. }
            | Command::RenameFolder { torrent_id, .. }
            | Command::SetFilePriorities { torrent_id, .. }
            | Command::RemoveTorrent { torrent_id, .. } => torrent_id,
        }
    }
}

/// A command as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(flatten)]
    pub command: Command,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    TorrentAdded {
        torrent_id: String,
    },
    TorrentRemoved {
        torrent_id: String,
    },
    TorrentStateChanged {
        torrent_id: String,
        state: String,
    },
    TorrentFileRenamed {
        torrent_id: String,
        index: usize,
        new_path: String,
    },
    TorrentFolderRenamed {
        torrent_id: String,
        old_path: String,
        new_path: String,
    },
    SessionPaused,
    SessionResumed,
}

impl SessionEvent {
    pub fn torrent_id(&self) -> Option<&str> {
        match self {
            SessionEvent::TorrentAdded { torrent_id }
            | SessionEvent::TorrentRemoved { torrent_id }
            | SessionEvent::TorrentStateChanged { torrent_id, .. }
            | SessionEvent::TorrentFileRenamed { torrent_id, .. }
            | SessionEvent::TorrentFolderRenamed { torrent_id, .. } => Some(torrent_id),
            SessionEvent::SessionPaused | SessionEvent::SessionResumed => None,
        }
    }

    /// Whether the event changes which torrents exist or how they filter.
    pub fn changes_torrent_set(&self) -> bool {
        matches!(
            self,
            SessionEvent::TorrentAdded { .. }
                | SessionEvent::TorrentRemoved { .. }
                | SessionEvent::TorrentStateChanged { .. }
        )
    }
}

/// Session backed by a daemon state directory.
#[derive(Debug, Clone)]
pub struct StateDirSession {
    state_dir: PathBuf,
    command_dir: PathBuf,
    sequence: Arc<AtomicU64>,
}

impl StateDirSession {
    pub fn new(state_dir: impl Into<PathBuf>, command_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            command_dir: command_dir.into(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn command_dir(&self) -> &Path {
        &self.command_dir
    }

    fn torrents_dir(&self) -> PathBuf {
        self.state_dir.join("torrents")
    }

    fn events_dir(&self) -> PathBuf {
        self.state_dir.join("events")
    }

    async fn load_torrents(&self) -> Result<Vec<(String, Record)>> {
        let mut out = Vec::new();
        for path in json_files(&self.torrents_dir()).await? {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match read_json::<Record>(&path).await {
                Ok(record) => out.push((id, record)),
                Err(e) => warn!("Skipping unreadable status file {}: {:#}", path.display(), e),
            }
        }
        Ok(out)
    }
}

/// `*.json` files directly in `dir`, sorted by name; temporary files are
/// skipped and a missing directory is empty.
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(".tmp") || name.starts_with('.') {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn matches_filter(record: &Record, filter: &StatusFilter) -> bool {
    filter.iter().all(|(field, wanted)| {
        record
            .get(field)
            .map(|value| value.to_string() == *wanted)
            .unwrap_or(false)
    })
}

fn restrict(record: Record, fields: &[String]) -> Record {
    if fields.is_empty() {
        return record;
    }
    record
        .iter()
        .filter(|(name, _)| fields.iter().any(|f| f == name))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

impl SessionProxy for StateDirSession {
    async fn get_torrents_status(&self, filter: &StatusFilter, fields: &[String]) -> Result<Snapshot<String>> {
        let torrents = self.load_torrents().await?;
        let snapshot: Snapshot<String> = torrents
            .into_iter()
            .filter(|(_, record)| matches_filter(record, filter))
            .map(|(id, record)| (id, restrict(record, fields)))
            .collect();
        debug!(torrents = snapshot.len(), "status snapshot loaded");
        Ok(snapshot)
    }

    async fn get_torrent_status(&self, torrent_id: &str, fields: &[String]) -> Result<Record> {
        let path = self.torrents_dir().join(format!("{}.json", torrent_id));
        let record: Record = read_json(&path)
            .await
            .with_context(|| format!("No status for torrent {}", torrent_id))?;
        Ok(restrict(record, fields))
    }

    async fn get_filter_tree(&self, show_zero: bool, hidden_categories: &[&str]) -> Result<FilterCounts> {
        let torrents: Snapshot<String> = self.load_torrents().await?.into_iter().collect();
        Ok(count_filters(&torrents, show_zero, hidden_categories))
    }

    async fn drain_events(&self) -> Result<Vec<SessionEvent>> {
        let mut events = Vec::new();
        for path in json_files(&self.events_dir()).await? {
            match read_json::<SessionEvent>(&path).await {
                Ok(event) => events.push(event),
                Err(e) => warn!("Discarding unparsable event {}: {:#}", path.display(), e),
            }
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove event file: {}", path.display()))?;
        }
        Ok(events)
    }
}

impl CommandSink for StateDirSession {
    async fn send(&self, command: Command) -> Result<()> {
        tokio::fs::create_dir_all(&self.command_dir)
            .await
            .with_context(|| format!("Failed to create command directory: {}", self.command_dir.display()))?;

        let envelope = CommandEnvelope {
            command,
            timestamp: Utc::now(),
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stem = format!(
            "{}-{}-{}",
            envelope.command.action(),
            envelope.timestamp.timestamp_millis(),
            seq
        );
        let command_file = self.command_dir.join(format!("{}.json", stem));
        let temp_file = self.command_dir.join(format!(".{}.json.tmp", stem));

        tokio::fs::write(&temp_file, serde_json::to_string_pretty(&envelope)?)
            .await
            .with_context(|| format!("Failed to write command file: {}", temp_file.display()))?;
        tokio::fs::rename(&temp_file, &command_file).await.with_context(|| {
            format!(
                "Failed to rename command file: {} -> {}",
                temp_file.display(),
                command_file.display()
            )
        })?;

        info!(
            action = envelope.command.action(),
            torrent = envelope.command.torrent_id(),
            "command sent"
        );
        Ok(())
    }
}
