//! Shared runtime state for envmon-daemon.
//!
//! Handlers receive `State<Arc<AppState>>`. Lock order is users, then desk,
//! then certificates; the audit writer is only taken with no other lock held.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use envmon_audit::AuditWriter;
use envmon_config::DeskSettings;
use envmon_schemas::User;
use envmon_workflow::{CertificateRegister, ProformaDesk, TransitionRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Proforma(TransitionRecord),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    /// user id -> user
    pub users: Arc<RwLock<BTreeMap<String, User>>>,
    pub desk: Arc<RwLock<ProformaDesk>>,
    pub certificates: Arc<RwLock<CertificateRegister>>,
    /// `None` when no audit path is configured.
    pub audit: Option<Arc<Mutex<AuditWriter>>>,
    pub result_decimals: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Empty directory, no audit log, default settings.
    pub fn new() -> Self {
        Self::build(&DeskSettings::default(), None)
    }

    /// Seed the directory from settings and open (or resume) the audit log.
    pub fn from_settings(settings: &DeskSettings) -> anyhow::Result<Self> {
        let audit = match &settings.audit {
            Some(a) => {
                let w = AuditWriter::resume(&a.path, a.hash_chain)
                    .with_context(|| format!("open audit log {}", a.path.display()))?;
                info!(path = %a.path.display(), seq = w.seq(), hash_chain = a.hash_chain, "audit log ready");
                Some(w)
            }
            None => None,
        };
        Ok(Self::build(settings, audit))
    }

    fn build(settings: &DeskSettings, audit: Option<AuditWriter>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let users = settings
            .users
            .iter()
            .map(|u| (u.id.clone(), u.clone()))
            .collect();

        Self {
            bus,
            build: BuildInfo {
                service: "envmon-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            users: Arc::new(RwLock::new(users)),
            desk: Arc::new(RwLock::new(ProformaDesk::new())),
            certificates: Arc::new(RwLock::new(CertificateRegister::new(
                settings.expiry_warning_days,
            ))),
            audit: audit.map(|w| Arc::new(Mutex::new(w))),
            result_decimals: settings.result_decimals,
        }
    }

    /// Log, audit and broadcast applied transitions.
    pub async fn publish_transitions(&self, records: Vec<TransitionRecord>) {
        for rec in records {
            info!(
                proforma_id = %rec.proforma_id,
                from = %rec.from,
                to = %rec.to,
                event = %rec.event,
                actor = %rec.actor,
                "proforma transition"
            );
            let payload = serde_json::to_value(&rec).unwrap_or(Value::Null);
            self.audit_event(&rec.proforma_id, "proforma", rec.event.as_str(), payload, rec.at)
                .await;
            let _ = self.bus.send(BusMsg::Proforma(rec));
        }
    }

    /// Append to the audit log if one is configured. A write failure is
    /// logged and surfaced on the bus; the request itself still succeeds.
    pub async fn audit_event(
        &self,
        subject_id: &str,
        topic: &str,
        event_type: &str,
        payload: Value,
        at: DateTime<Utc>,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let res = audit
            .lock()
            .await
            .append(subject_id, topic, event_type, payload, at);
        if let Err(e) = res {
            warn!(error = %format!("{e:#}"), subject_id, topic, event_type, "audit append failed");
            let _ = self.bus.send(BusMsg::LogLine {
                level: "ERROR".to_string(),
                msg: format!("audit append failed for {subject_id}: {e}"),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
