use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use swarmview_core::client::{run_poll_loop, Client};
use swarmview_core::columns::NamedIcons;
use swarmview_core::config::ClientConfig;
use swarmview_core::filter::FilterRow;
use swarmview_core::poll::PollState;
use swarmview_core::projection::CheckState;
use swarmview_core::session::StateDirSession;
use swarmview_core::tree::NodeId;
use swarmview_core::value::Record;
use swarmview_core::views::{ApplyOutcome, DetailsView, PeerListView};
use tempfile::TempDir;

const ALPHA: &str = r#"{
    "name": "Alpha", "queue": 0, "state": "Downloading", "progress": 45.0,
    "total_wanted": 110, "total_done": 50, "tracker_host": "example.org",
    "download_payload_rate": 2048.0, "upload_payload_rate": 0.0,
    "files": [
        {"index": 0, "path": "Alpha/disc1/a.bin", "size": 100, "offset": 0},
        {"index": 1, "path": "Alpha/b.nfo", "size": 10, "offset": 100}
    ],
    "file_progress": [0.5, 0.0],
    "file_priorities": [1, 1],
    "peers": [
        {"ip": "10.0.0.2:6881", "client": "qBittorrent", "progress": 0.5,
         "down_speed": 100.0, "up_speed": 0.0, "country": "NL", "seed": false},
        {"ip": "10.0.0.3:6881", "client": "Deluge", "progress": 1.0,
         "down_speed": 0.0, "up_speed": 10.0, "country": "DE", "seed": true}
    ]
}"#;

const BRAVO: &str = r#"{
    "name": "Bravo", "queue": 1, "state": "Seeding", "progress": 100.0,
    "tracker_host": "example.org",
    "files": [{"index": 0, "path": "bravo.iso", "size": 700}],
    "file_progress": [1.0], "file_priorities": [1], "peers": []
}"#;

fn setup() -> (TempDir, Client<StateDirSession>) {
    let dir = TempDir::new().unwrap();
    let torrents = dir.path().join("state/torrents");
    fs::create_dir_all(&torrents).unwrap();
    fs::write(torrents.join("aaa.json"), ALPHA).unwrap();
    fs::write(torrents.join("bbb.json"), BRAVO).unwrap();

    let config = ClientConfig {
        state_dir: dir.path().join("state"),
        command_dir: Some(dir.path().join("commands")),
        poll_interval_ms: 10,
        ..Default::default()
    };
    let session = StateDirSession::new(config.state_dir.clone(), config.command_dir());
    let client = Client::new(session, config, Arc::new(NamedIcons));
    (dir, client)
}

fn write_event(dir: &TempDir, name: &str, json: &str) {
    let events = dir.path().join("state/events");
    fs::create_dir_all(&events).unwrap();
    fs::write(events.join(name), json).unwrap();
}

fn command_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_first_tick_fills_torrent_list_only() {
    let (_dir, mut client) = setup();
    let report = client.tick().await;

    assert_eq!(report.updated, 1);
    assert_eq!(client.torrents().model().row_count(), 2);
    assert_eq!(client.torrents().model().key_at(0), Some(&"aaa".to_string()));
    assert_eq!(client.filters().selected(), Some(("state", "All")));
    assert!(client.peers().torrent().is_none());
    assert_eq!(client.files().cached(), 0);
}

#[tokio::test]
async fn test_selection_drives_dependent_views() {
    let (_dir, mut client) = setup();
    client.tick().await;
    assert!(client.select_torrent_row(0));
    assert_eq!(client.peers().torrent(), Some("aaa"));
    assert_eq!(client.files().required_fields()[0], "files");

    let report = client.tick().await;
    assert_eq!(report.updated, 4);
    assert_eq!(report.stale, 0);

    assert_eq!(client.peers().model().row_count(), 2);
    let tree = client.files().current().unwrap();
    assert_eq!(tree.file_count(), 2);
    let alpha = tree.find_dir("Alpha").unwrap();
    assert!(client.files().current_binding().unwrap().is_expanded(&alpha));
    assert_eq!(
        client.files().required_fields(),
        vec!["file_progress".to_string(), "file_priorities".to_string()]
    );

    let lines = client.details().lines();
    assert!(lines.contains(&("Name", "Alpha".to_string())));
    assert_eq!(client.details().progress(), Some(0.45));
}

#[tokio::test]
async fn test_quiet_poll_emits_no_signals() {
    let (_dir, mut client) = setup();
    client.tick().await;
    client.drain_signals();

    client.tick().await;
    assert!(client.drain_signals().is_empty());
}

#[tokio::test]
async fn test_rename_event_patches_cached_tree() {
    let (dir, mut client) = setup();
    client.tick().await;
    client.select_torrent_row(0);
    client.tick().await;
    let alpha = client.files().current().unwrap().find_dir("Alpha").unwrap();
    client.drain_signals();

    write_event(
        &dir,
        "0001.json",
        r#"{"event": "torrent_file_renamed", "torrent_id": "aaa", "index": 1, "new_path": "Alpha/extras/b.nfo"}"#,
    );
    let report = client.tick().await;
    assert_eq!(report.events, 1);

    let tree = client.files().current().unwrap();
    assert_eq!(tree.find_dir("Alpha"), Some(alpha));
    let extras = tree.find_dir("Alpha/extras").unwrap();
    assert!(client.files().current_binding().unwrap().is_expanded(&alpha));
    client.drain_signals();
    assert!(client.files().current_binding().unwrap().is_expanded(&extras));
}

#[tokio::test]
async fn test_removed_torrent_clears_dependents() {
    let (dir, mut client) = setup();
    client.tick().await;
    client.select_torrent_row(0);
    client.tick().await;
    assert_eq!(client.files().cached(), 1);

    fs::remove_file(dir.path().join("state/torrents/aaa.json")).unwrap();
    write_event(&dir, "0001.json", r#"{"event": "torrent_removed", "torrent_id": "aaa"}"#);
    let report = client.tick().await;

    assert_eq!(client.files().cached(), 0);
    assert_eq!(client.torrents().model().row_count(), 1);
    assert_eq!(client.torrents().selected_torrent(), None);
    assert_eq!(client.peers().torrent(), None);
    assert_eq!(client.peers().model().row_count(), 0);
    assert!(client.details().lines().is_empty());
    assert!(report.stale >= 1);
}

#[tokio::test]
async fn test_filter_selection_narrows_list() {
    let (_dir, mut client) = setup();
    client.tick().await;

    let row = client
        .filters()
        .rows()
        .iter()
        .position(|row| matches!(row, FilterRow::Value(_, v) if v.value == "Seeding"))
        .unwrap();
    assert!(client.select_filter_row(row));
    assert!(client.wants_refresh());

    client.tick().await;
    assert_eq!(client.torrents().model().row_count(), 1);
    assert_eq!(client.torrents().model().key_at(0), Some(&"bbb".to_string()));
    assert_eq!(client.filters().selected(), Some(("state", "Seeding")));
}

#[tokio::test]
async fn test_user_intents_become_commands() {
    let (dir, mut client) = setup();
    client.tick().await;
    client.select_torrent_row(0);
    client.tick().await;

    let node = client.files().current().unwrap().file_node(0).unwrap();
    assert!(client.set_file_priority(node, 0).await.unwrap());
    assert_eq!(
        client.files().current().unwrap().check_state(node),
        Some(CheckState::Unchecked)
    );

    assert!(client.rename_file(node, "a-renamed.bin").await.unwrap());
    assert_eq!(
        client.files().current().unwrap().path(node),
        Some("Alpha/disc1/a-renamed.bin".to_string())
    );

    assert_eq!(client.remove_selected(true).await.unwrap(), 1);

    let files = command_files(&dir.path().join("commands"));
    assert_eq!(files.len(), 3);
    assert!(files.iter().any(|f| f.starts_with("set-file-priority-")));
    assert!(files.iter().any(|f| f.starts_with("rename-file-")));
    assert!(files.iter().any(|f| f.starts_with("remove-")));
}

#[tokio::test]
async fn test_intents_without_a_torrent_send_nothing() {
    let (dir, mut client) = setup();
    client.tick().await;
    let root = swarmview_core::tree::NodeId::ROOT;
    assert!(!client.set_file_priority(root, 0).await.unwrap());
    assert_eq!(client.remove_selected(false).await.unwrap(), 0);
    assert!(command_files(&dir.path().join("commands")).is_empty());
}

#[tokio::test]
async fn test_poll_loop_ticks_until_shutdown() {
    let (_dir, mut client) = setup();
    let mut ticks = 0;
    run_poll_loop(
        &mut client,
        tokio::time::sleep(Duration::from_millis(60)),
        |_, _| ticks += 1,
    )
    .await;
    assert!(ticks >= 1);
    assert_eq!(client.torrents().model().row_count(), 2);
}

#[test]
fn test_peer_response_for_old_subject_is_stale() {
    let config = ClientConfig::default();
    let mut peers = PeerListView::new(Arc::new(NamedIcons), &config);
    peers.set_torrent(Some("aaa".to_string()));
    let ticket = peers.begin_tick().unwrap();
    assert!(peers.begin_tick().is_none());

    peers.set_torrent(Some("bbb".to_string()));
    let outcome = peers.apply(ticket, Ok(Record::new()));
    assert_eq!(outcome, ApplyOutcome::Stale);
    assert!(peers.begin_tick().is_some());
}

#[test]
fn test_failed_fetch_keeps_details() {
    let mut details = DetailsView::new();
    details.set_torrent(Some("aaa".to_string()));

    let ticket = details.begin_tick().unwrap();
    let status = Record::new().with("name", "Alpha").with("progress", 10.0);
    assert_eq!(details.apply(ticket, Ok(status)), ApplyOutcome::Updated);

    let ticket = details.begin_tick().unwrap();
    let outcome = details.apply(ticket, Err(anyhow::anyhow!("daemon went away")));
    assert_eq!(outcome, ApplyOutcome::Failed);
    assert_eq!(details.progress(), Some(0.1));
}

#[test]
fn test_hidden_view_does_not_fetch() {
    let mut poll: PollState<String> = PollState::with_required_subject();
    assert!(poll.begin_tick().is_none());
    poll.set_subject(Some("aaa".to_string()));
    poll.set_visible(false);
    assert!(poll.begin_tick().is_none());
    poll.set_visible(true);
    assert!(poll.begin_tick().is_some());
}

#[tokio::test]
async fn test_collapsing_a_folder_hides_its_files() {
    let (_dir, mut client) = setup();
    client.tick().await;
    client.select_torrent_row(0);
    client.tick().await;
    client.drain_signals();

    let alpha = client.files().current().unwrap().find_dir("Alpha").unwrap();
    let disc1 = client.files().current().unwrap().find_dir("Alpha/disc1").unwrap();
    client.files_mut().set_expanded(disc1, true);

    let tree = client.files().current().unwrap();
    let shown: Vec<(String, usize)> = client
        .files()
        .visible_nodes()
        .into_iter()
        .map(|(node, depth)| (tree.name(node).unwrap().to_string(), depth))
        .collect();
    assert_eq!(shown[0], ("Alpha".to_string(), 0));
    assert!(shown.contains(&("disc1".to_string(), 1)));
    assert!(shown.contains(&("a.bin".to_string(), 2)));

    client.files_mut().set_expanded(disc1, false);
    let names: Vec<NodeId> = client.files().visible_nodes().into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&disc1));
    assert_eq!(names.len(), 3);

    client.files_mut().set_expanded(alpha, false);
    assert_eq!(client.files().visible_nodes(), vec![(alpha, 0)]);
}
