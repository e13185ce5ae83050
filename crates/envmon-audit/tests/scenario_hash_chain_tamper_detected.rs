//! Scenario: Audit hash chain tamper detection.
//!
//! # Invariant under test
//!
//! A chained log written by `AuditWriter` verifies as valid. Editing a
//! payload, deleting a line, or reordering lines is reported as `Broken` at
//! the first affected line. A resumed writer continues the same chain.

use chrono::{TimeZone, Utc};
use envmon_audit::{verify_hash_chain, verify_hash_chain_str, AuditWriter, VerifyResult};
use serde_json::json;

fn write_five(path: &std::path::Path) {
    let mut writer = AuditWriter::new(path, true).unwrap();
    for i in 0..5 {
        writer
            .append(
                "PF-000001",
                "proforma",
                "transition",
                json!({"index": i, "to": format!("status_{i}")}),
                Utc.with_ymd_and_hms(2024, 6, 1, 8, i, 0).unwrap(),
            )
            .unwrap();
    }
}

#[test]
fn untampered_chain_verifies_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_five(&path);

    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 5 });
}

#[test]
fn tampered_payload_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_five(&path);

    let content = std::fs::read_to_string(&path).unwrap();
    let tampered = content.replacen("status_2", "status_X", 1);
    assert_ne!(content, tampered);

    match verify_hash_chain_str(&tampered).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3);
            assert!(reason.contains("hash_self"), "{reason}");
        }
        other => panic!("expected Broken, got {other:?}"),
    }
}

#[test]
fn deleted_line_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_five(&path);

    let content = std::fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, l)| l)
        .collect();

    let res = verify_hash_chain_str(&kept.join("\n")).unwrap();
    assert!(matches!(res, VerifyResult::Broken { line: 2, .. }), "{res:?}");
}

#[test]
fn resumed_writer_continues_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("audit.jsonl");
    write_five(&path);

    let mut writer = AuditWriter::resume(&path, true).unwrap();
    assert_eq!(writer.seq(), 5);
    assert!(writer.last_hash().is_some());

    let ev = writer
        .append(
            "USR-004",
            "proforma",
            "transition",
            json!({"event": "reopen"}),
            Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap(),
        )
        .unwrap();
    assert_eq!(ev.seq, 5);
    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 6 });
}

#[test]
fn unchained_log_still_checks_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.jsonl");
    let mut writer = AuditWriter::new(&path, false).unwrap();
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    for i in 0..3 {
        let ev = writer.append("ISO-0001", "certificate", "uploaded", json!({"i": i}), ts).unwrap();
        assert!(ev.hash_self.is_none());
    }
    assert!(verify_hash_chain(&path).unwrap().is_valid());
}
