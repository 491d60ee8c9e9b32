//! Deny-list and persisted-gate files.

use std::fs;

use tlpfuzz_feedback::{ExecutionScoreboard, FeedbackError};
use tlpfuzz_types::{CompositeKey, FeatureId, FeatureRegistry, GeneratorNode};

#[test]
fn deny_list_disables_features_and_composites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disabled_options.txt");
    fs::write(&path, "COLLATE\nOPADD-TEXT\n\nNOT_A_FEATURE\nFN_ABS\n").unwrap();

    let mut registry = FeatureRegistry::new();
    let abs = registry.register_function("abs");
    let mut board = ExecutionScoreboard::new();
    let loaded = board.load_deny_list(&path, &registry).unwrap();

    assert_eq!(loaded, 3);
    assert!(!board.is_enabled(FeatureId::from(GeneratorNode::Collate)));
    assert!(!board.is_enabled(abs));
    assert!(!board.composite_enabled(&CompositeKey::new("OPADD", "TEXT")));
    assert!(board.is_enabled(FeatureId::from(GeneratorNode::Case)));
}

#[test]
fn deny_list_does_not_override_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deny.txt");
    fs::write(&path, "CASE\n").unwrap();

    let registry = FeatureRegistry::new();
    let mut board = ExecutionScoreboard::new();
    board.set_enabled(FeatureId::from(GeneratorNode::Case), true);
    assert_eq!(board.load_deny_list(&path, &registry).unwrap(), 0);
    assert!(board.is_enabled(FeatureId::from(GeneratorNode::Case)));
}

#[test]
fn missing_deny_list_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FeatureRegistry::new();
    let mut board = ExecutionScoreboard::new();
    let loaded = board
        .load_deny_list(&dir.path().join("absent.txt"), &registry)
        .unwrap();
    assert_eq!(loaded, 0);
}

#[test]
fn persisted_gates_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs/gates.txt");
    let registry = FeatureRegistry::new();

    let mut board = ExecutionScoreboard::new();
    board.set_enabled(FeatureId::from(GeneratorNode::Collate), false);
    board.set_enabled(FeatureId::from(GeneratorNode::Case), true);
    board.set_composite(CompositeKey::new("OPADD", "TEXT"), false);
    board.persist(&path, &registry).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("COLLATE : false\n"));
    assert!(text.contains("CASE : true\n"));
    assert!(text.contains("OPADD-TEXT : false\n"));
    assert!(text.contains("UNTYPE_EXPR : false\n"));

    let mut restored = ExecutionScoreboard::new();
    assert_eq!(restored.load_persisted(&path, &registry).unwrap(), 4);
    assert!(!restored.is_enabled(FeatureId::from(GeneratorNode::Collate)));
    assert!(restored.is_enabled(FeatureId::from(GeneratorNode::Case)));
    assert!(!restored.composite_enabled(&CompositeKey::new("OPADD", "TEXT")));
}

#[test]
fn malformed_persisted_line_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gates.txt");
    fs::write(&path, "CASE : true\nCOLLATE maybe\n").unwrap();

    let registry = FeatureRegistry::new();
    let mut board = ExecutionScoreboard::new();
    let err = board.load_persisted(&path, &registry).unwrap_err();
    assert!(matches!(err, FeedbackError::MalformedEntry { line: 2, .. }));
}
