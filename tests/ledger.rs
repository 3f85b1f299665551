use std::fs;

use tranche_dock::ledger::{LedgerDocument, ProgressLedger};

#[test]
fn missing_file_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let ledger = ProgressLedger::load(&temp.path().join("state.json"));
    assert!(ledger.is_empty());
}

#[test]
fn mark_is_idempotent_and_survives_reload() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("results").join("state.json");

    let ledger = ProgressLedger::load(&path);
    assert!(ledger.mark_completed("/data/a.pdbqt"));
    assert!(!ledger.mark_completed("/data/a.pdbqt"));
    assert!(ledger.mark_completed("/data/b.pdbqt"));
    ledger.save().unwrap();

    let reloaded = ProgressLedger::load(&path);
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.is_completed("/data/a.pdbqt"));
    assert!(reloaded.is_completed("/data/b.pdbqt"));
    assert!(!reloaded.is_completed("/data/c.pdbqt"));

    let document: LedgerDocument =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(document.completed_ligands, ["/data/a.pdbqt", "/data/b.pdbqt"]);
    assert!(document.updated_at.is_some());
}

#[test]
fn corrupt_file_loads_empty_and_is_overwritten() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("state.json");
    fs::write(&path, "{\"completed_ligands\": [\"a\",").unwrap();

    let ledger = ProgressLedger::load(&path);
    assert!(ledger.is_empty());
    ledger.mark_completed("b");
    assert!(ledger.save_or_warn());
    assert_eq!(ProgressLedger::load(&path).len(), 1);
}

#[test]
fn legacy_document_without_timestamp_loads() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("state.json");
    fs::write(&path, r#"{"completed_ligands": ["x", "y"]}"#).unwrap();
    assert_eq!(ProgressLedger::load(&path).len(), 2);
}

#[test]
fn save_failure_is_reported_not_fatal() {
    let temp = tempfile::tempdir().unwrap();
    // parent "directory" is a regular file, so the save cannot succeed
    let blocker = temp.path().join("blocker");
    fs::write(&blocker, b"x").unwrap();
    let ledger = ProgressLedger::load(&blocker.join("state.json"));
    ledger.mark_completed("a");
    assert!(!ledger.save_or_warn());
    assert!(ledger.is_completed("a"));
}

#[test]
fn reset_deletes_state() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("state.json");
    let ledger = ProgressLedger::load(&path);
    ledger.mark_completed("a");
    ledger.save().unwrap();

    assert!(ProgressLedger::reset(&path).unwrap());
    assert!(!path.exists());
    assert!(!ProgressLedger::reset(&path).unwrap());
    assert!(ProgressLedger::load(&path).is_empty());
}
