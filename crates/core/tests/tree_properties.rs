use proptest::prelude::*;
use std::collections::BTreeSet;
use swarmview_core::binding::ViewBinding;
use swarmview_core::columns::file_columns;
use swarmview_core::diff::SortOrder;
use swarmview_core::error::ModelError;
use swarmview_core::projection::{CellValue, CheckState, Role};
use swarmview_core::signal::ModelSignal;
use swarmview_core::tree::{FileEntry, FileTree, NodeId, RenameIntent};

fn sample_tree() -> FileTree {
    let mut tree = FileTree::new(file_columns());
    tree.update(vec![FileEntry::new(0, "a/b/c.txt", 10), FileEntry::new(1, "a/d.txt", 30)])
        .unwrap();
    tree
}

fn top_names(tree: &FileTree) -> Vec<String> {
    names_under(tree, NodeId::ROOT)
}

fn names_under(tree: &FileTree, dir: NodeId) -> Vec<String> {
    tree.children(dir)
        .iter()
        .filter_map(|&n| tree.name(n))
        .map(str::to_string)
        .collect()
}

fn paths_of(tree: &FileTree) -> Vec<(usize, String)> {
    tree.files()
        .filter_map(|f| {
            let node = tree.file_node(f.index)?;
            Some((f.index, tree.path(node)?))
        })
        .collect()
}

/// **Feature: swarmview, Property 5: Tree round trip**
/// Building from `a/b/c.txt` and `a/d.txt` gives one top-level folder whose
/// leaves rebuild exactly the input paths.
#[test]
fn test_round_trip_of_sample_paths() {
    let tree = sample_tree();
    assert_eq!(tree.children(NodeId::ROOT).len(), 1);
    let a = tree.find_dir("a").unwrap();
    let names: Vec<&str> = tree.children(a).iter().filter_map(|&n| tree.name(n)).collect();
    assert_eq!(names, vec!["b", "d.txt"]);
    assert_eq!(
        paths_of(&tree),
        vec![(0, "a/b/c.txt".to_string()), (1, "a/d.txt".to_string())]
    );
    assert!(tree.check_invariants().is_ok());
}

fn path_set_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set(
        proptest::collection::vec("[a-d]{1,2}", 1..4).prop_map(|parts| parts.join("/")),
        1..12,
    )
    .prop_map(|set| {
        // Drop paths that are a directory of another path.
        let all: Vec<String> = set.into_iter().collect();
        all.iter()
            .filter(|p| !all.iter().any(|q| q.starts_with(&format!("{}/", p))))
            .cloned()
            .collect()
    })
}

/// **Feature: swarmview, Property 5: Tree round trip**
/// *For any* set of non-clashing paths, every file node's rebuilt path is
/// its input path and the tree passes its consistency checks.
#[test]
fn property_tree_round_trip() {
    proptest!(|(paths in path_set_strategy())| {
        let entries: Vec<FileEntry> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| FileEntry::new(i, p.clone(), i as u64 + 1))
            .collect();
        let mut tree = FileTree::new(file_columns());
        tree.update(entries).unwrap();

        let expected: Vec<(usize, String)> = paths.iter().cloned().enumerate().collect();
        prop_assert_eq!(paths_of(&tree), expected);
        prop_assert!(tree.check_invariants().is_ok());
    });
}

/// **Feature: swarmview, Property 6: Rename pruning**
/// *For any* nested file that is the only file in its folder chain, moving
/// it to the top level removes every emptied folder and keeps the root.
#[test]
fn property_rename_prunes_empty_ancestors() {
    proptest!(|(depth in 1usize..5)| {
        let dirs: Vec<String> = (0..depth).map(|i| format!("d{}", i)).collect();
        let nested = format!("{}/leaf.bin", dirs.join("/"));
        let mut tree = FileTree::new(file_columns());
        tree.update(vec![FileEntry::new(0, nested, 5), FileEntry::new(1, "keep.txt", 1)])
            .unwrap();
        prop_assert_eq!(tree.directories().len(), depth);

        tree.rename(0, "leaf.bin").unwrap();

        prop_assert!(tree.directories().is_empty());
        prop_assert!(tree.contains(NodeId::ROOT));
        prop_assert_eq!(tree.children(NodeId::ROOT).len(), 2);
        prop_assert!(tree.check_invariants().is_ok());
    });
}

#[test]
fn test_rename_keeps_folder_with_remaining_files() {
    let mut tree = sample_tree();
    let a = tree.find_dir("a").unwrap();
    tree.rename(0, "c.txt").unwrap();

    assert_eq!(tree.find_dir("a"), Some(a));
    assert_eq!(tree.find_dir("a/b"), None);
    assert_eq!(
        paths_of(&tree),
        vec![(0, "c.txt".to_string()), (1, "a/d.txt".to_string())]
    );
}

#[test]
fn test_rename_into_clashing_path_fails() {
    let mut tree = sample_tree();
    let err = tree.rename(1, "a/b").unwrap_err();
    assert!(matches!(err, ModelError::InvariantViolation(_)));
    assert!(err.is_invariant_violation());
    assert_eq!(paths_of(&tree)[1], (1, "a/d.txt".to_string()));
}

#[test]
fn test_duplicate_paths_are_rejected_at_build() {
    let mut tree = FileTree::new(file_columns());
    let result = tree.update(vec![FileEntry::new(0, "x/y", 1), FileEntry::new(1, "x/y", 1)]);
    assert!(matches!(result, Err(ModelError::InvariantViolation(_))));
    assert!(tree.is_empty());
}

#[test]
fn test_folder_rename_keeps_node_identity() {
    let mut tree = sample_tree();
    let b = tree.find_dir("a/b").unwrap();
    let handle = tree.persistent_index(b, 0).unwrap();

    tree.rename_folder("a/b", "a/z").unwrap();

    assert_eq!(tree.find_dir("a/z"), Some(b));
    assert_eq!(tree.name(b), Some("z"));
    assert_eq!(tree.persistent_node(handle), Some(b));
    assert_eq!(paths_of(&tree)[0], (0, "a/z/c.txt".to_string()));
}

#[test]
fn test_folder_rename_onto_existing_folder_merges() {
    let mut tree = FileTree::new(file_columns());
    tree.update(vec![FileEntry::new(0, "x/1.txt", 1), FileEntry::new(1, "y/2.txt", 1)])
        .unwrap();
    tree.rename_folder("x", "y").unwrap();

    assert_eq!(tree.find_dir("x"), None);
    let y = tree.find_dir("y").unwrap();
    assert_eq!(tree.children(y).len(), 2);
    assert!(tree.check_invariants().is_ok());
}

#[test]
fn test_folder_rename_into_itself_fails() {
    let mut tree = sample_tree();
    assert!(tree.rename_folder("a", "a/b/a").is_err());
    assert!(tree.check_invariants().is_ok());
}

#[test]
fn test_patch_announces_new_folders() {
    let mut tree = sample_tree();
    tree.drain_signals();
    tree.update(vec![
        FileEntry::new(0, "a/b/c.txt", 10),
        FileEntry::new(1, "a/d.txt", 30),
        FileEntry::new(2, "e/f/g.txt", 1),
    ])
    .unwrap();

    let signals = tree.drain_signals();
    assert_eq!(signals.first(), Some(&ModelSignal::LayoutAboutToBeChanged));
    let created = signals
        .iter()
        .find_map(|s| match s {
            ModelSignal::NodesCreated(nodes) => Some(nodes.clone()),
            _ => None,
        })
        .unwrap();
    let created: BTreeSet<NodeId> = created.into_iter().collect();
    let expected: BTreeSet<NodeId> = [tree.find_dir("e").unwrap(), tree.find_dir("e/f").unwrap()]
        .into_iter()
        .collect();
    assert_eq!(created, expected);
}

#[test]
fn test_folder_aggregates() {
    let mut tree = sample_tree();
    tree.set_file_status(vec![1.0, 0.0], vec![1, 0]);
    let a = tree.find_dir("a").unwrap();

    assert_eq!(tree.data(a, 1, Role::Display), Some(CellValue::Text("40 B".to_string())));
    // Size weighted: 10 bytes done out of 40.
    assert_eq!(tree.data(a, 2, Role::User), Some(CellValue::Number(0.25)));
    assert_eq!(tree.check_state(a), Some(CheckState::PartiallyChecked));
    assert_eq!(tree.data(a, 3, Role::Display), Some(CellValue::Text(String::new())));
}

#[test]
fn test_folder_priority_sets_every_file() {
    let mut tree = sample_tree();
    let a = tree.find_dir("a").unwrap();
    let mut pairs = tree.set_priority(a, 0).unwrap();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![(0, 0), (1, 0)]);
    assert_eq!(tree.check_state(a), Some(CheckState::Unchecked));
}

#[test]
fn test_request_rename_of_folder() {
    let mut tree = sample_tree();
    let b = tree.find_dir("a/b").unwrap();
    let intent = tree.request_rename(b, "bee").unwrap();
    assert_eq!(
        intent,
        RenameIntent::Folder {
            old_path: "a/b".to_string(),
            new_path: "a/bee".to_string(),
        }
    );
    assert_eq!(tree.find_dir("a/bee"), Some(b));
}

#[test]
fn test_expansion_survives_patch() {
    let mut tree = sample_tree();
    let mut binding: ViewBinding<NodeId> = ViewBinding::new();
    let a = tree.find_dir("a").unwrap();
    binding.set_expanded(a, true);

    binding
        .apply(&mut tree, |t| {
            t.update(vec![
                FileEntry::new(0, "a/b/c.txt", 10),
                FileEntry::new(1, "a/d.txt", 30),
                FileEntry::new(2, "a/e.txt", 2),
            ])
        })
        .unwrap();

    assert!(binding.is_expanded(&a));
    assert_eq!(tree.find_dir("a"), Some(a));
}

/// **Feature: swarmview, Property 8: Sorted tree after restructuring**
/// Moving a file into a new folder sorts the folder by its final size, not
/// by the size it had while it was still empty.
#[test]
fn test_rename_into_new_folder_sorts_by_final_size() {
    let mut tree = FileTree::new(file_columns());
    tree.sort(1, SortOrder::Ascending);
    tree.update(vec![FileEntry::new(0, "a/x", 10), FileEntry::new(1, "b/y", 5)])
        .unwrap();
    assert_eq!(top_names(&tree), vec!["b", "a"]);

    tree.rename(0, "c/x").unwrap();

    assert_eq!(top_names(&tree), vec!["b", "c"]);
    assert!(tree.check_invariants().is_ok());
}

/// **Feature: swarmview, Property 8: Sorted tree after restructuring**
/// *For any* sizes, a tree sorted by size keeps every level ascending after
/// a patch that moves files between fresh folders.
#[test]
fn property_patch_keeps_size_order() {
    proptest!(|(sizes in proptest::collection::vec(1u64..1000, 2..6))| {
        let mut tree = FileTree::new(file_columns());
        tree.sort(1, SortOrder::Ascending);
        let first: Vec<FileEntry> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| FileEntry::new(i, format!("d{}/f{}", i % 2, i), s))
            .collect();
        tree.update(first).unwrap();
        let moved: Vec<FileEntry> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| FileEntry::new(i, format!("n{}/f{}", i, i), s))
            .collect();
        tree.update(moved).unwrap();

        let top: Vec<u64> = tree
            .children(NodeId::ROOT)
            .iter()
            .filter_map(|&n| tree.file_index(tree.children(n)[0]))
            .map(|i| sizes[i])
            .collect();
        let mut sorted = top.clone();
        sorted.sort_unstable();
        prop_assert_eq!(top, sorted);
        prop_assert!(tree.check_invariants().is_ok());
    });
}

#[test]
fn test_moving_between_folders_resorts_both_chains() {
    let mut tree = FileTree::new(file_columns());
    tree.sort(1, SortOrder::Ascending);
    tree.update(vec![
        FileEntry::new(0, "a/p/x", 8),
        FileEntry::new(1, "a/p/y", 4),
        FileEntry::new(2, "b/z", 10),
    ])
    .unwrap();
    assert_eq!(top_names(&tree), vec!["b", "a"]);

    // a shrinks to 4 and b grows to 18.
    tree.rename(0, "b/x").unwrap();

    assert_eq!(top_names(&tree), vec!["a", "b"]);
    let b = tree.find_dir("b").unwrap();
    assert_eq!(names_under(&tree, b), vec!["x", "z"]);
}

#[test]
fn test_progress_change_resorts_and_relayouts() {
    let mut tree = FileTree::new(file_columns());
    tree.sort(2, SortOrder::Ascending);
    tree.update(vec![FileEntry::new(0, "x", 1), FileEntry::new(1, "y", 1)])
        .unwrap();
    assert_eq!(top_names(&tree), vec!["x", "y"]);
    tree.drain_signals();

    tree.set_file_status(vec![0.9, 0.1], vec![1, 1]);

    assert_eq!(top_names(&tree), vec!["y", "x"]);
    let signals = tree.drain_signals();
    assert_eq!(signals.first(), Some(&ModelSignal::LayoutAboutToBeChanged));
    assert!(signals.contains(&ModelSignal::LayoutChanged));
    assert!(signals.iter().any(|s| matches!(s, ModelSignal::DataChanged { .. })));
}

#[test]
fn test_size_change_resorts_ancestor_folders() {
    let mut tree = FileTree::new(file_columns());
    tree.sort(1, SortOrder::Ascending);
    tree.update(vec![FileEntry::new(0, "a/p/x", 1), FileEntry::new(1, "b/y", 5)])
        .unwrap();
    assert_eq!(top_names(&tree), vec!["a", "b"]);

    tree.update(vec![FileEntry::new(0, "a/p/x", 10), FileEntry::new(1, "b/y", 5)])
        .unwrap();

    assert_eq!(top_names(&tree), vec!["b", "a"]);
}

#[test]
fn test_status_change_off_the_sort_column_keeps_layout() {
    let mut tree = FileTree::new(file_columns());
    tree.sort(1, SortOrder::Ascending);
    tree.update(vec![FileEntry::new(0, "x", 1), FileEntry::new(1, "y", 2)])
        .unwrap();
    tree.drain_signals();

    tree.set_file_status(vec![0.9, 0.1], vec![1, 1]);

    let signals = tree.drain_signals();
    assert!(!signals.contains(&ModelSignal::LayoutChanged));
    assert_eq!(top_names(&tree), vec!["x", "y"]);
}

#[test]
fn test_new_folder_sorts_by_progress() {
    let mut tree = FileTree::new(file_columns());
    tree.sort(2, SortOrder::Ascending);
    tree.update(vec![FileEntry::new(0, "x", 1), FileEntry::new(1, "a/y", 1)])
        .unwrap();
    tree.set_file_status(vec![0.5, 0.2], vec![1, 1]);
    assert_eq!(top_names(&tree), vec!["a", "x"]);

    tree.update(vec![
        FileEntry::new(0, "x", 1),
        FileEntry::new(1, "a/y", 1),
        FileEntry::new(2, "b/z", 1),
    ])
    .unwrap();

    // No status reported for z yet, so b sorts as 0% done.
    assert_eq!(top_names(&tree), vec!["b", "a", "x"]);
    assert!(tree.check_invariants().is_ok());
}
