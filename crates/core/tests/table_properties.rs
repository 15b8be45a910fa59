use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use swarmview_core::binding::ViewBinding;
use swarmview_core::columns::{torrent_columns, NamedIcons};
use swarmview_core::diff::SortOrder;
use swarmview_core::projection::{CellValue, Column, Projection, Role};
use swarmview_core::signal::ModelSignal;
use swarmview_core::table::TableModel;
use swarmview_core::value::{Record, Snapshot};

fn torrent(name: &str, queue: i64, state: &str) -> Record {
    Record::new()
        .with("name", name)
        .with("queue", queue)
        .with("state", state)
        .with("progress", 50.0)
        .with("download_payload_rate", 0.0)
}

fn three_torrents() -> Snapshot<String> {
    Snapshot::new()
        .with("aaa".into(), torrent("Alpha", 0, "Downloading"))
        .with("bbb".into(), torrent("Bravo", 1, "Seeding"))
        .with("ccc".into(), torrent("Charlie", 2, "Paused"))
}

/// **Feature: swarmview, Property 7: Poll scenario**
/// Three unchanged torrents polled twice produce no signals on the second
/// poll; a fourth torrent produces exactly one layout change and the
/// selection follows its key.
#[test]
fn test_three_then_four_torrents() {
    let mut model: TableModel<String> = TableModel::new(torrent_columns(Arc::new(NamedIcons)));
    model.sort(0, SortOrder::Ascending);
    let mut binding: ViewBinding<String> = ViewBinding::new();

    binding
        .apply(&mut model, |m| {
            m.update(three_torrents());
            Ok(())
        })
        .unwrap();
    model.drain_signals();

    binding
        .apply(&mut model, |m| {
            m.update(three_torrents());
            Ok(())
        })
        .unwrap();
    assert!(model.drain_signals().is_empty());

    binding.select(&model, "bbb".to_string());
    assert!(binding.set_current(&mut model, &"bbb".to_string()));
    assert_eq!(binding.selected_rows(&model), vec![1]);

    // The newcomer is queued first, so every existing row shifts.
    let four = three_torrents().with("ddd".into(), torrent("Delta", -1, "Queued"));
    binding
        .apply(&mut model, |m| {
            m.update(four);
            Ok(())
        })
        .unwrap();

    assert_eq!(
        model.drain_signals(),
        vec![ModelSignal::LayoutAboutToBeChanged, ModelSignal::LayoutChanged]
    );
    assert_eq!(model.row_count(), 4);
    assert_eq!(binding.selected_keys(), &["bbb".to_string()]);
    assert_eq!(binding.selected_rows(&model), vec![2]);
    assert_eq!(binding.current_row(&model), Some(2));
    assert_eq!(binding.current_key(&model), Some("bbb".to_string()));
}

#[test]
fn test_removed_selection_is_dropped() {
    let mut model: TableModel<String> = TableModel::new(torrent_columns(Arc::new(NamedIcons)));
    let mut binding: ViewBinding<String> = ViewBinding::new();
    binding
        .apply(&mut model, |m| {
            m.update(three_torrents());
            Ok(())
        })
        .unwrap();
    binding.select(&model, "ccc".to_string());

    let two = Snapshot::new()
        .with("aaa".into(), torrent("Alpha", 0, "Downloading"))
        .with("bbb".into(), torrent("Bravo", 1, "Seeding"));
    binding
        .apply(&mut model, |m| {
            m.update(two);
            Ok(())
        })
        .unwrap();
    assert!(binding.selected_keys().is_empty());
}

fn rates_strategy() -> impl Strategy<Value = BTreeMap<String, i64>> {
    proptest::collection::btree_map("[a-h]{1,2}", 0i64..100, 0..16)
}

fn rate_snapshot(items: &BTreeMap<String, i64>) -> Snapshot<String> {
    items
        .iter()
        .map(|(k, q)| (k.clone(), torrent(k, *q, "Seeding")))
        .collect()
}

/// **Feature: swarmview, Property 4: Reference remapping**
/// *For any* two snapshots, a reference to a surviving key reports that
/// key's new row, and a reference to a removed key reports none.
#[test]
fn property_persistent_rows_follow_keys() {
    proptest!(|(before in rates_strategy(), after in rates_strategy(), sorted in any::<bool>())| {
        let mut model: TableModel<String> = TableModel::new(torrent_columns(Arc::new(NamedIcons)));
        if sorted {
            model.sort(0, SortOrder::Descending);
        }
        model.update(rate_snapshot(&before));

        let handles: Vec<(String, _)> = before
            .keys()
            .filter_map(|k| model.persistent_index(k, 1).map(|h| (k.clone(), h)))
            .collect();
        prop_assert_eq!(handles.len(), before.len());

        model.update(rate_snapshot(&after));

        for (key, handle) in handles {
            if after.contains_key(&key) {
                prop_assert_eq!(model.persistent_row(handle), model.row_of(&key));
                prop_assert_eq!(model.persistent_key(handle), Some(&key));
            } else {
                prop_assert_eq!(model.persistent_row(handle), None);
            }
        }
        prop_assert_eq!(model.row_count(), after.len());
    });
}

#[test]
fn test_required_fields_skip_hidden_columns() {
    let model: TableModel<String> = TableModel::new(torrent_columns(Arc::new(NamedIcons)));
    let fields = model.required_fields(|name| name == "Save Path" || name == "Avail");
    assert!(fields.contains(&"name".to_string()));
    assert!(fields.contains(&"state".to_string()));
    assert!(!fields.contains(&"save_path".to_string()));
    assert!(!fields.contains(&"distributed_copies".to_string()));
}

#[test]
fn test_required_fields_keep_sort_column_even_when_hidden() {
    let mut model: TableModel<String> = TableModel::new(torrent_columns(Arc::new(NamedIcons)));
    let save_path = model.find_column("Save Path").unwrap();
    model.sort(save_path, SortOrder::Ascending);
    let fields = model.required_fields(|name| name == "Save Path");
    assert!(fields.contains(&"save_path".to_string()));
}

#[test]
fn test_progress_change_marks_progress_cells() {
    let mut model: TableModel<String> = TableModel::new(torrent_columns(Arc::new(NamedIcons)));
    model.update(three_torrents());
    model.drain_signals();

    let changed = three_torrents().with(
        "bbb".into(),
        torrent("Bravo", 1, "Seeding").with("progress", 75.0),
    );
    model.update(changed);

    let progress = model.find_column("Progress").unwrap();
    let row = model.row_of(&"bbb".to_string()).unwrap();
    assert_eq!(
        model.drain_signals(),
        vec![ModelSignal::DataChanged {
            parent: None,
            rows: row..=row,
            columns: progress..=progress,
        }]
    );
}

fn mixed_columns() -> Vec<Column> {
    vec![
        Column::new("Name", 20).text(Projection::field("name")),
        Column::new("Value", 8).text(Projection::field("v")).sort(Projection::field("v")),
    ]
}

#[test]
fn test_unsortable_update_still_applies_data() {
    let mut model: TableModel<String> = TableModel::new(mixed_columns());
    model.sort(1, SortOrder::Ascending);
    model.update(
        Snapshot::new()
            .with("a".into(), Record::new().with("name", "one").with("v", 5))
            .with("b".into(), Record::new().with("name", "two").with("v", "five")),
    );
    let before = model.order().to_vec();
    model.drain_signals();

    model.update(
        Snapshot::new()
            .with("a".into(), Record::new().with("name", "one").with("v", 1))
            .with("b".into(), Record::new().with("name", "two").with("v", "five")),
    );

    assert_eq!(model.order(), before.as_slice());
    let row = model.row_of(&"a".to_string()).unwrap();
    assert_eq!(model.data(row, 1, Role::Display), Some(CellValue::Text("1".to_string())));
    assert!(model
        .drain_signals()
        .iter()
        .any(|s| matches!(s, ModelSignal::DataChanged { .. })));
}

#[test]
fn test_missing_field_renders_empty_cell() {
    let mut model: TableModel<String> = TableModel::new(mixed_columns());
    model.sort(1, SortOrder::Ascending);
    model.update(
        Snapshot::new()
            .with("a".into(), Record::new().with("name", "one").with("v", 2))
            .with("b".into(), Record::new().with("name", "two")),
    );

    assert_eq!(model.row_count(), 2);
    let row = model.row_of(&"b".to_string()).unwrap();
    assert_eq!(model.data(row, 1, Role::Display), None);
    assert_eq!(model.data(row, 0, Role::Display), Some(CellValue::Text("two".to_string())));
}
