//! Append-only audit log for desk activity.
//!
//! JSON Lines, one event per line, keys sorted. With the hash chain enabled
//! each event carries `hash_prev` (the previous event's `hash_self`) and
//! `hash_self` (SHA-256 of the canonical event without `hash_self`), so any
//! edit, reorder or deletion is detectable by [`verify_hash_chain`].
//!
//! The log is an export. Nothing reads it back except verification and
//! [`AuditWriter::resume`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace for v5 event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_7c2e_45a0_4b7e_9c3d_e2a8_51f0_b6d4);

pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Events appended so far. Feeds `event_id` derivation.
    seq: u64,
}

impl AuditWriter {
    /// Creates the writer and ensures parent dirs exist. Does not touch the file.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Open an existing log and continue its chain.
    ///
    /// Restores `seq` from the number of events and `last_hash` from the
    /// final event. A missing file behaves like [`AuditWriter::new`].
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        if !w.path.exists() {
            return Ok(w);
        }
        let content = fs::read_to_string(&w.path)
            .with_context(|| format!("read audit log {:?}", w.path))?;
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let ev: AuditEvent = serde_json::from_str(trimmed)
                .with_context(|| format!("parse audit event at line {}", i + 1))?;
            w.seq += 1;
            w.last_hash = ev.hash_self;
        }
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hash_chain(&self) -> bool {
        self.hash_chain
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event stamped `ts_utc`.
    ///
    /// `subject_id` names what the event is about (a proforma id, a user id,
    /// a certificate id).
    pub fn append(
        &mut self,
        subject_id: &str,
        topic: &str,
        event_type: &str,
        payload: Value,
        ts_utc: DateTime<Utc>,
    ) -> Result<AuditEvent> {
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq)?;

        let mut ev = AuditEvent {
            event_id,
            seq: self.seq,
            subject_id: subject_id.to_string(),
            ts_utc,
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        // Only advance once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub seq: u64,
    pub subject_id: String,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Deterministic event id: UUIDv5 over the previous hash, the canonical
/// payload and the sequence number. Two writers fed the same events produce
/// the same ids.
pub fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let canonical = serde_json::to_string(&sort_keys(payload)).context("serialize payload failed")?;
    let material = format!("{}|{}|{}", prev_hash.unwrap_or("-"), seq, canonical);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, material.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 hex of the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Verify JSONL content in memory. Line numbers in the result are 1-based
/// positions in `content`.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut expected_seq = 0u64;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = match serde_json::from_str(trimmed) {
            Ok(ev) => ev,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("unparseable event: {e}"),
                })
            }
        };
        line_count += 1;

        if ev.seq != expected_seq {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("seq gap: expected {expected_seq}, got {}", ev.seq),
            });
        }
        expected_seq += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = ev.hash_self {
            let recomputed = compute_event_hash(&ev)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_id_is_deterministic_and_key_order_insensitive() {
        let a = derive_event_id(Some("abc"), &json!({"x": 1, "y": 2}), 3).unwrap();
        let b = derive_event_id(Some("abc"), &json!({"y": 2, "x": 1}), 3).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, derive_event_id(Some("abc"), &json!({"x": 1, "y": 2}), 4).unwrap());
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn canonical_line_sorts_nested_keys() {
        let line = canonical_json_line(&json!({"b": {"z": 1, "a": 2}, "a": [ {"d": 0, "c": 1} ]}))
            .unwrap();
        assert_eq!(line, r#"{"a":[{"c":1,"d":0}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn empty_content_is_valid() {
        assert_eq!(
            verify_hash_chain_str("\n\n").unwrap(),
            VerifyResult::Valid { lines: 0 }
        );
    }

    #[test]
    fn garbage_line_reports_broken() {
        let res = verify_hash_chain_str("not json\n").unwrap();
        assert!(matches!(res, VerifyResult::Broken { line: 1, .. }));
    }
}
