//! Typed settings read from the merged config JSON.

use anyhow::{bail, Context, Result};
use envmon_schemas::{User, UserPermissions, UserRole};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8899";
const DEFAULT_WARNING_DAYS: i64 = 90;
const DEFAULT_DECIMALS: usize = 2;
const MAX_DECIMALS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub path: PathBuf,
    pub hash_chain: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeskSettings {
    pub bind_addr: SocketAddr,
    /// `None` when `/audit/path` is absent: no audit log is written.
    pub audit: Option<AuditSettings>,
    pub expiry_warning_days: i64,
    pub result_decimals: usize,
    /// Initial user directory.
    pub users: Vec<User>,
}

#[derive(Deserialize)]
struct DirectoryEntry {
    id: String,
    name: String,
    #[serde(default)]
    email: String,
    role: String,
    department: String,
    /// Overrides the role defaults when present.
    #[serde(default)]
    permissions: Option<UserPermissions>,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8899)),
            audit: None,
            expiry_warning_days: DEFAULT_WARNING_DAYS,
            result_decimals: DEFAULT_DECIMALS,
            users: Vec::new(),
        }
    }
}

impl DeskSettings {
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let mut s = Self::default();

        if let Some(raw) = v.pointer("/daemon/bind_addr") {
            let text = raw.as_str().context("/daemon/bind_addr must be a string")?;
            s.bind_addr = text
                .parse()
                .with_context(|| format!("/daemon/bind_addr is not host:port: {text}"))?;
        }

        if let Some(raw) = v.pointer("/audit/path") {
            let path = raw.as_str().context("/audit/path must be a string")?.trim();
            if path.is_empty() {
                bail!("/audit/path must not be empty");
            }
            let hash_chain = match v.pointer("/audit/hash_chain") {
                None => true,
                Some(b) => b.as_bool().context("/audit/hash_chain must be a boolean")?,
            };
            s.audit = Some(AuditSettings {
                path: PathBuf::from(path),
                hash_chain,
            });
        }

        if let Some(raw) = v.pointer("/certificates/expiry_warning_days") {
            let days = raw
                .as_i64()
                .context("/certificates/expiry_warning_days must be an integer")?;
            if days < 0 {
                bail!("/certificates/expiry_warning_days must be >= 0, got {days}");
            }
            s.expiry_warning_days = days;
        }

        if let Some(raw) = v.pointer("/stats/result_decimals") {
            let d = raw
                .as_u64()
                .context("/stats/result_decimals must be a non-negative integer")?
                as usize;
            if d > MAX_DECIMALS {
                bail!("/stats/result_decimals must be <= {MAX_DECIMALS}, got {d}");
            }
            s.result_decimals = d;
        }

        if let Some(raw) = v.pointer("/directory/users") {
            s.users = parse_directory(raw)?;
        }

        Ok(s)
    }
}

fn parse_directory(raw: &Value) -> Result<Vec<User>> {
    let entries: Vec<DirectoryEntry> = serde_json::from_value(raw.clone())
        .context("/directory/users must be a list of users")?;

    let mut seen = BTreeSet::new();
    let mut users = Vec::with_capacity(entries.len());
    for (i, e) in entries.into_iter().enumerate() {
        let id = e.id.trim().to_string();
        if id.is_empty() {
            bail!("/directory/users/{i}/id must not be empty");
        }
        if !seen.insert(id.clone()) {
            bail!("/directory/users/{i}: duplicate user id '{id}'");
        }
        let role = UserRole::parse(&e.role)
            .with_context(|| format!("/directory/users/{i}/role: unknown role '{}'", e.role))?;

        let mut user = User::with_role_defaults(id, e.name.trim(), e.email.trim(), role, e.department.trim());
        if let Some(p) = e.permissions {
            user.permissions = p;
        }
        users.push(user);
    }
    Ok(users)
}
