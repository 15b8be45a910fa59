//! Column sets for the torrent list, the peer list, the file tree and the
//! details pane.

use std::sync::Arc;

use crate::formats::{
    fdate, fpcnt, fpeer, fpieces, fpriority, fqueue, fratio, fsize, fsize2, fspeed, fspeed_limit, ftime,
};
use crate::projection::{CellValue, CheckState, Column, Icon, Projection, Role};
use crate::sort_key::{peer_address_key, SortKey};
use crate::value::Value;

/// Maps domain values to icon handles. Front-ends plug in their own.
pub trait IconResolver: Send + Sync {
    fn state_icon(&self, state: &str) -> Option<Icon>;
    fn tracker_icon(&self, host: &str) -> Option<Icon>;
    fn flag_icon(&self, country: &str) -> Option<Icon>;
}

/// Resolver that hands out plain icon names.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedIcons;

impl IconResolver for NamedIcons {
    fn state_icon(&self, state: &str) -> Option<Icon> {
        let name = match state {
            "Allocating" | "Checking" => "checking",
            "Downloading" => "downloading",
            "Seeding" => "seeding",
            "Paused" => "inactive",
            "Error" => "alert",
            "Queued" => "queued",
            _ => return None,
        };
        Some(Icon::named(name))
    }

    fn tracker_icon(&self, host: &str) -> Option<Icon> {
        (!host.is_empty()).then(|| Icon::named(format!("tracker:{}", host)))
    }

    fn flag_icon(&self, country: &str) -> Option<Icon> {
        (!country.is_empty()).then(|| Icon::named(format!("flag:{}", country.to_lowercase())))
    }
}

fn number_text<F>(field: &str, format: F) -> Projection
where
    F: Fn(f64) -> String + Send + Sync + 'static,
{
    Projection::map(field, move |v| v.as_f64().map(|n| CellValue::Text(format(n))))
}

fn peer_counts(num: &str, total: &str) -> Projection {
    Projection::computed(&[num, total], |values| {
        let num = values[0].as_i64()?;
        let total = values[1].as_i64()?;
        Some(CellValue::Text(fpeer(num, total)))
    })
}

/// Rate with the torrent's own limit (KiB/s) beside it.
fn limited_speed(rate: &str, limit: &str) -> Projection {
    Projection::computed(&[rate, limit], |values| {
        let rate = values[0].as_f64()?;
        let limit = values[1].as_f64()? as i64;
        Some(CellValue::Text(fspeed_limit(rate, limit)))
    })
}

fn torrent_progress_text(state: &str, progress: f64) -> String {
    if state != "Seeding" && progress < 100.0 {
        format!("{} {}", state, fpcnt(progress))
    } else {
        state.to_string()
    }
}

pub fn torrent_columns(icons: Arc<dyn IconResolver>) -> Vec<Column> {
    let state_icons = Arc::clone(&icons);
    let tracker_icons = icons;
    vec![
        Column::new("#", 4)
            .text(number_text("queue", |q| fqueue(q as i64)))
            .sort(Projection::field("queue")),
        Column::new("Name", 45)
            .text(Projection::field("name"))
            .icon(Projection::map("state", move |v| {
                state_icons.state_icon(v.as_str()?).map(CellValue::Icon)
            }))
            .sort(Projection::map("name", |v| Some(CellValue::Key(SortKey::natural(v.as_str()?))))),
        Column::new("Size", 8)
            .text(number_text("total_wanted", |b| fsize(b as u64)))
            .sort(Projection::field("total_wanted")),
        Column::new("Progress", 18)
            .text(Projection::computed(&["state", "progress"], |values| {
                Some(CellValue::Text(torrent_progress_text(
                    values[0].as_str()?,
                    values[1].as_f64()?,
                )))
            }))
            .user(Projection::map("progress", |v| v.as_f64().map(|p| CellValue::Number(p * 0.01))))
            .sort(Projection::computed(&["progress", "state"], |values| {
                Some(CellValue::Key(SortKey::tuple([
                    SortKey::from(values[0]),
                    SortKey::from(values[1]),
                ])))
            })),
        Column::new("Seeders", 10)
            .text(peer_counts("num_seeds", "total_seeds"))
            .sort(Projection::field("num_seeds")),
        Column::new("Peers", 10)
            .text(peer_counts("num_peers", "total_peers"))
            .sort(Projection::field("num_peers")),
        Column::new("Down Speed", 10)
            .text(number_text("download_payload_rate", fspeed))
            .sort(Projection::field("download_payload_rate")),
        Column::new("Up Speed", 10)
            .text(number_text("upload_payload_rate", fspeed))
            .sort(Projection::field("upload_payload_rate")),
        Column::new("ETA", 8)
            .text(number_text("eta", |s| ftime(s as i64)))
            .sort(Projection::field("eta")),
        Column::new("Ratio", 6)
            .text(number_text("ratio", fratio))
            .sort(Projection::field("ratio")),
        Column::new("Avail", 6)
            .text(number_text("distributed_copies", fratio))
            .sort(Projection::field("distributed_copies")),
        Column::new("Added", 16)
            .text(number_text("time_added", fdate))
            .sort(Projection::field("time_added")),
        Column::new("Tracker", 20)
            .text(Projection::field("tracker_host"))
            .icon(Projection::map("tracker_host", move |v| {
                tracker_icons.tracker_icon(v.as_str()?).map(CellValue::Icon)
            }))
            .sort(Projection::field("tracker_host")),
        Column::new("Save Path", 20)
            .text(Projection::field("save_path"))
            .sort(Projection::field("save_path")),
    ]
}

pub fn peer_columns(icons: Arc<dyn IconResolver>) -> Vec<Column> {
    vec![
        Column::new("", 3)
            .icon(Projection::map("country", move |v| {
                icons.flag_icon(v.as_str()?).map(CellValue::Icon)
            }))
            .tooltip(Projection::map("country", |v| {
                Some(CellValue::Text(v.as_str()?.to_uppercase()))
            }))
            .sort(Projection::field("country")),
        Column::new("Address", 20)
            .text(Projection::field("ip"))
            .icon(Projection::map("seed", |v| {
                let name = if v.as_bool()? { "seeding" } else { "downloading" };
                Some(CellValue::Icon(Icon::named(name)))
            }))
            .sort(Projection::map("ip", |v| Some(CellValue::Key(peer_address_key(v.as_str()?))))),
        Column::new("Client", 15)
            .text(Projection::field("client"))
            .sort(Projection::field("client")),
        Column::new("Progress", 15)
            .text(number_text("progress", |p| fpcnt(p * 100.0)))
            .user(Projection::field("progress"))
            .sort(Projection::field("progress")),
        Column::new("Down Speed", 10)
            .text(number_text("down_speed", fspeed))
            .sort(Projection::field("down_speed")),
        Column::new("Up Speed", 10)
            .text(number_text("up_speed", fspeed))
            .sort(Projection::field("up_speed")),
    ]
}

fn priority_icon(priority: i64) -> Option<Icon> {
    let name = match priority {
        0 => "gtk-no",
        1 => "gtk-yes",
        2 => "go-up",
        5 => "go-top",
        _ => return None,
    };
    Some(Icon::named(name))
}

/// Columns of the file tree. Field names are those tree items expose.
pub fn file_columns() -> Vec<Column> {
    let mut filename = Column::new("Filename", 45)
        .text(Projection::field("name"))
        .icon(Projection::map("index", |v| {
            Some(CellValue::Icon(Icon::named(if v.is_null() { "folder" } else { "file" })))
        }))
        .sort(Projection::map("name", |v| Some(CellValue::Key(SortKey::natural(v.as_str()?)))));
    filename.augment(
        Role::CheckState,
        Projection::map("check_state", |v| {
            let state = match v.as_i64()? {
                0 => CheckState::Unchecked,
                1 => CheckState::PartiallyChecked,
                _ => CheckState::Checked,
            };
            Some(CellValue::Check(state))
        }),
    );
    vec![
        filename,
        Column::new("Size", 10)
            .text(number_text("size", |b| fsize(b as u64)))
            .sort(Projection::field("size")),
        Column::new("Progress", 12)
            .text(number_text("progress", |p| fpcnt(p * 100.0)))
            .user(Projection::field("progress"))
            .sort(Projection::field("progress")),
        Column::new("Priority", 12)
            .text(Projection::map("priority", |v| {
                Some(CellValue::Text(match v {
                    Value::Null => String::new(),
                    other => fpriority(other.as_i64()?).to_string(),
                }))
            }))
            .icon(Projection::map("priority", |v| priority_icon(v.as_i64()?).map(CellValue::Icon)))
            .sort(Projection::field("priority")),
    ]
}

/// Labelled lines of the details pane.
pub fn details_columns() -> Vec<Column> {
    let text = |label: &str, projection: Projection| Column::new(label, 0).text(projection);
    vec![
        text("Name", Projection::field("name")),
        text("Downloaded", Projection::computed(&["total_done", "total_wanted"], |values| {
            let done = values[0].as_f64()? as u64;
            let wanted = values[1].as_f64()? as u64;
            Some(CellValue::Text(format!("{} of {}", fsize(done), fsize(wanted))))
        })),
        text("Uploaded", Projection::computed(&["total_uploaded", "total_payload_upload"], |values| {
            let total = values[0].as_f64()? as u64;
            let session = values[1].as_f64().map(|b| b as u64);
            Some(CellValue::Text(fsize2(total, session)))
        })),
        text("Down Speed", limited_speed("download_payload_rate", "max_download_speed")),
        text("Up Speed", limited_speed("upload_payload_rate", "max_upload_speed")),
        text("Seeders", peer_counts("num_seeds", "total_seeds")),
        text("Peers", peer_counts("num_peers", "total_peers")),
        text("ETA", number_text("eta", |s| ftime(s as i64))),
        text("Share Ratio", number_text("ratio", fratio)),
        text("Tracker Status", Projection::field("tracker_status")),
        text("Next Announce", number_text("next_announce", |s| ftime(s as i64))),
        text("Active Time", number_text("active_time", |s| ftime(s as i64))),
        text("Seeding Time", number_text("seeding_time", |s| ftime(s as i64))),
        text("Date Added", number_text("time_added", fdate)),
        text("Total Size", number_text("total_size", |b| fsize(b as u64))),
        text("Files", Projection::field("num_files")),
        text("Pieces", Projection::computed(&["num_pieces", "piece_length"], |values| {
            Some(CellValue::Text(fpieces(values[0].as_i64()?, values[1].as_f64()? as u64)))
        })),
        text("Save Path", Projection::field("save_path")),
        text("Hash", Projection::field("hash")),
        text("Comment", Projection::field("comment")),
        Column::new("Progress", 0)
            .text(number_text("progress", fpcnt))
            .user(Projection::map("progress", |v| v.as_f64().map(|p| CellValue::Number(p * 0.01)))),
    ]
}
