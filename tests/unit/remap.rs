//! Unit tests for the CSV event remap table

use addon_operator::controller::csv_events::{CsvEventTable, CsvKey};

#[test]
fn test_replace_map_installs_reverse_index() {
    let table = CsvEventTable::new();
    let key = CsvKey::new("addon-ns", "reference-addon.v0.1.0");

    assert!(table.replace_map("my-addon", &[key.clone()]));
    assert_eq!(table.addon_for(&key), Some("my-addon".to_string()));
}

#[test]
fn test_replace_map_is_idempotent() {
    let table = CsvEventTable::new();
    let key = CsvKey::new("addon-ns", "reference-addon.v0.1.0");

    assert!(table.replace_map("my-addon", &[key.clone()]));
    // Same contents: no change, no retry needed
    assert!(!table.replace_map("my-addon", &[key]));
}

#[test]
fn test_replace_map_drops_stale_keys() {
    let table = CsvEventTable::new();
    let old = CsvKey::new("addon-ns", "reference-addon.v0.1.0");
    let new = CsvKey::new("addon-ns", "reference-addon.v0.2.0");

    table.replace_map("my-addon", &[old.clone()]);
    assert!(table.replace_map("my-addon", &[new.clone()]));

    assert_eq!(table.addon_for(&old), None);
    assert_eq!(table.addon_for(&new), Some("my-addon".to_string()));
}

#[test]
fn test_csv_moves_between_addons() {
    let table = CsvEventTable::new();
    let key = CsvKey::new("shared-ns", "common.v1.0.0");

    table.replace_map("addon-a", &[key.clone()]);
    assert!(table.replace_map("addon-b", &[key.clone()]));

    // 1-to-1 reverse index: the later mapping wins
    assert_eq!(table.addon_for(&key), Some("addon-b".to_string()));
}

#[test]
fn test_free_clears_all_entries() {
    let table = CsvEventTable::new();
    let a = CsvKey::new("ns", "a.v1");
    let b = CsvKey::new("ns", "b.v1");

    table.replace_map("my-addon", &[a.clone(), b.clone()]);
    table.free("my-addon");

    assert_eq!(table.addon_for(&a), None);
    assert_eq!(table.addon_for(&b), None);
    // Mapping again after free reports a change
    assert!(table.replace_map("my-addon", &[a]));
}

#[test]
fn test_reverse_index_reflects_latest_replace_only() {
    let table = CsvEventTable::new();
    let first = CsvKey::new("ns", "first.v1");
    let second = CsvKey::new("ns", "second.v1");

    table.replace_map("my-addon", &[first.clone(), second.clone()]);
    table.replace_map("my-addon", &[second.clone()]);

    assert_eq!(table.addon_for(&first), None);
    assert_eq!(table.addon_for(&second), Some("my-addon".to_string()));
}
