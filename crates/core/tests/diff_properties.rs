use proptest::prelude::*;
use std::collections::BTreeMap;
use swarmview_core::diff::{diff, DiffOutcome, SortSpec};
use swarmview_core::projection::{Column, Projection};
use swarmview_core::value::{Record, Snapshot};

fn columns() -> Vec<Column> {
    vec![
        Column::new("Name", 20).text(Projection::field("name")),
        Column::new("Rate", 8).text(Projection::field("rate")),
    ]
}

fn snapshot_strategy() -> impl Strategy<Value = BTreeMap<String, (String, i64)>> {
    proptest::collection::btree_map("t[0-9]{1,2}", ("[a-z]{1,6}", 0i64..1000), 0..20)
}

fn to_snapshot(items: &BTreeMap<String, (String, i64)>) -> Snapshot<String> {
    items
        .iter()
        .map(|(key, (name, rate))| (key.clone(), Record::new().with("name", name.as_str()).with("rate", *rate)))
        .collect()
}

/// **Feature: swarmview, Property 1: Idempotence**
/// *For any* snapshot, diffing it against itself reports no change, with or
/// without a sort.
#[test]
fn property_diff_of_equal_snapshots_is_unchanged() {
    proptest!(|(items in snapshot_strategy(), sorted in any::<bool>())| {
        let snapshot = to_snapshot(&items);
        let order: Vec<String> = items.keys().cloned().collect();
        let sort = sorted.then(|| SortSpec::ascending(0));
        let outcome = diff(&snapshot, &order, &snapshot.clone(), &columns(), sort);
        prop_assert!(outcome.is_unchanged());
    });
}

/// **Feature: swarmview, Property 2: Order stability**
/// *For any* snapshot sorted by name, changing only rates keeps the key set
/// and the order: the outcome is never structural.
#[test]
fn property_changes_outside_sort_column_keep_order() {
    proptest!(|(items in snapshot_strategy(), bump in 1i64..50)| {
        let old = to_snapshot(&items);
        let order: Vec<String> = items.keys().cloned().collect();
        let changed: BTreeMap<String, (String, i64)> = items
            .iter()
            .map(|(k, (name, rate))| (k.clone(), (name.clone(), rate + bump)))
            .collect();
        let new = to_snapshot(&changed);

        match diff(&old, &order, &new, &columns(), Some(SortSpec::ascending(0))) {
            DiffOutcome::DataOnly { rows, fields } => {
                prop_assert_eq!(rows.len(), items.len());
                prop_assert!(fields.iter().all(|f| f == "rate"));
            }
            DiffOutcome::Unchanged => prop_assert!(items.is_empty()),
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }
    });
}

/// **Feature: swarmview, Property 2: Order stability**
/// *For any* unsorted table, survivors keep their relative order when keys
/// are added and removed.
#[test]
fn property_survivors_keep_relative_order() {
    proptest!(|(old_items in snapshot_strategy(), new_items in snapshot_strategy())| {
        let old = to_snapshot(&old_items);
        let new = to_snapshot(&new_items);
        let mut order: Vec<String> = old_items.keys().cloned().collect();
        order.reverse();

        if let DiffOutcome::Structural { order: next, added, removed } =
            diff(&old, &order, &new, &columns(), None)
        {
            let survivors: Vec<&String> = order.iter().filter(|k| new.contains_key(k)).collect();
            let kept: Vec<&String> = next.iter().filter(|k| old.contains_key(k)).collect();
            prop_assert_eq!(survivors, kept);
            prop_assert_eq!(next.len(), new.len());
            prop_assert!(added.iter().all(|k| !old.contains_key(k)));
            prop_assert!(removed.iter().all(|k| !new.contains_key(k)));
        }
    });
}

#[test]
fn test_sort_field_change_that_keeps_order_is_data_only() {
    let old: Snapshot<String> = Snapshot::new()
        .with("a".into(), Record::new().with("name", "alpha").with("rate", 1))
        .with("b".into(), Record::new().with("name", "beta").with("rate", 2));
    let new = old
        .clone()
        .with("b".into(), Record::new().with("name", "beta2").with("rate", 2));
    let order = vec!["a".to_string(), "b".to_string()];

    let outcome = diff(&old, &order, &new, &columns(), Some(SortSpec::ascending(0)));
    assert!(matches!(outcome, DiffOutcome::DataOnly { ref rows, .. } if rows == &vec![1]));
}

#[test]
fn test_sort_field_change_that_reorders_is_structural() {
    let old: Snapshot<String> = Snapshot::new()
        .with("a".into(), Record::new().with("name", "alpha").with("rate", 1))
        .with("b".into(), Record::new().with("name", "beta").with("rate", 2));
    let new = old
        .clone()
        .with("a".into(), Record::new().with("name", "zulu").with("rate", 1));
    let order = vec!["a".to_string(), "b".to_string()];

    match diff(&old, &order, &new, &columns(), Some(SortSpec::ascending(0))) {
        DiffOutcome::Structural { order, added, removed } => {
            assert_eq!(order, vec!["b".to_string(), "a".to_string()]);
            assert!(added.is_empty());
            assert!(removed.is_empty());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_newcomer_without_sort_field_keeps_order() {
    let old: Snapshot<String> = Snapshot::new()
        .with("a".into(), Record::new().with("name", "alpha").with("rate", 1))
        .with("b".into(), Record::new().with("name", "beta").with("rate", 2));
    let new = old.clone().with("c".into(), Record::new().with("rate", 3));
    let order = vec!["a".to_string(), "b".to_string()];

    match diff(&old, &order, &new, &columns(), Some(SortSpec::ascending(0))) {
        DiffOutcome::Structural { order, added, removed } => {
            assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
            assert_eq!(added, vec!["c".to_string()]);
            assert!(removed.is_empty());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_sort_field_dropped_from_record_is_data_only() {
    let old: Snapshot<String> = Snapshot::new()
        .with("a".into(), Record::new().with("name", "zulu").with("rate", 1))
        .with("b".into(), Record::new().with("name", "beta").with("rate", 2));
    let new = old.clone().with("b".into(), Record::new().with("rate", 2));
    let order = vec!["a".to_string(), "b".to_string()];

    let outcome = diff(&old, &order, &new, &columns(), Some(SortSpec::ascending(0)));
    assert!(matches!(outcome, DiffOutcome::DataOnly { ref rows, .. } if rows == &vec![1]));
}

#[test]
fn test_mixed_sort_value_types_keep_order() {
    let columns = vec![Column::new("Value", 8).sort(Projection::field("v"))];
    let old: Snapshot<String> = Snapshot::new()
        .with("a".into(), Record::new().with("v", 5))
        .with("b".into(), Record::new().with("v", "five"));
    let new = old.clone().with("c".into(), Record::new().with("v", 0));
    let order = vec!["a".to_string(), "b".to_string()];

    match diff(&old, &order, &new, &columns, Some(SortSpec::ascending(0))) {
        DiffOutcome::Structural { order, .. } => {
            assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
