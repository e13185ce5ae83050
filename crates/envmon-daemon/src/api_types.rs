//! Request and response types for the envmon-daemon HTTP endpoints.
//!
//! `Serialize + Deserialize` so tests can decode them. No business logic.

use std::collections::BTreeMap;

use envmon_schemas::{IsoCertificate, RowStatus, UserPermissions};
use envmon_stats::AggregateFn;
use envmon_workflow::{ExpiryInfo, ExpiryStatus, ReportScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// validation | not_found | access_denied | illegal_transition | locked |
    /// stats | unauthorized | conflict
    pub kind: String,
}

// ---------------------------------------------------------------------------
// /v1/users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserRequest {
    /// Generated as `USR-NNN` when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: String,
    pub department: String,
    #[serde(default)]
    pub permissions: Option<UserPermissions>,
}

// ---------------------------------------------------------------------------
// /v1/proformas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub assigned_to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRowRequest {
    /// field id -> value; `null` clears the cell.
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub field_id: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRowRequest {
    pub decision: RowStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateRequest {
    pub field_id: String,
    pub function: AggregateFn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveCalculationRequest {
    pub field_id: String,
    pub function: AggregateFn,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateResponse {
    pub field_id: String,
    pub function: AggregateFn,
    pub formula: String,
    pub result: f64,
    /// `result` rendered with the configured number of decimals.
    pub formatted: String,
}

// ---------------------------------------------------------------------------
// /v1/stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    /// Wire name or alias (`std_dev`, `mean`, ...).
    pub function: String,
    pub values: Vec<f64>,
    #[serde(default)]
    pub decimals: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub function: AggregateFn,
    pub label: String,
    pub count: usize,
    pub result: f64,
    pub formatted: String,
}

// ---------------------------------------------------------------------------
// /v1/reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub scope: ReportScope,
}

// ---------------------------------------------------------------------------
// /v1/certificates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: IsoCertificate,
    #[serde(flatten)]
    pub expiry: ExpiryInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificatesResponse {
    pub warning_days: i64,
    pub counts: BTreeMap<ExpiryStatus, usize>,
    pub certificates: Vec<CertificateView>,
}
