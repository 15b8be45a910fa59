use proptest::prelude::*;
use swarmview_core::natsort::{natural_sort, NaturalKey};

/// **Feature: swarmview, Property 3: Natural sort**
/// *For any* list of `file<N>` names, natural sorting orders them by the
/// numeric value of `N`, not by its digits.
#[test]
fn property_numeric_runs_sort_by_value() {
    proptest!(|(mut numbers in proptest::collection::vec(0u32..100_000, 1..30))| {
        let mut names: Vec<String> = numbers.iter().map(|n| format!("file{}", n)).collect();
        natural_sort(&mut names);

        numbers.sort_unstable();
        let expected: Vec<String> = numbers.iter().map(|n| format!("file{}", n)).collect();
        prop_assert_eq!(names, expected);
    });
}

/// **Feature: swarmview, Property 3: Natural sort**
/// *For any* two strings, the natural key comparison is antisymmetric.
#[test]
fn property_natural_order_is_antisymmetric() {
    proptest!(|(a in "[a-c0-9 ._-]{0,12}", b in "[a-c0-9 ._-]{0,12}")| {
        let ka = NaturalKey::new(&a);
        let kb = NaturalKey::new(&b);
        prop_assert_eq!(ka.cmp(&kb), kb.cmp(&ka).reverse());
    });
}

#[test]
fn test_known_example() {
    let mut names = vec!["file2", "file10", "file1"];
    natural_sort(&mut names);
    assert_eq!(names, vec!["file1", "file2", "file10"]);
}

#[test]
fn test_mixed_episode_names() {
    let mut names = vec!["Show S01E10.mkv", "Show S01E2.mkv", "Show S01E1.mkv"];
    natural_sort(&mut names);
    assert_eq!(names, vec!["Show S01E1.mkv", "Show S01E2.mkv", "Show S01E10.mkv"]);
}
