//! Shared data model for the environment-monitoring proforma workflow.
//!
//! Plain `Serialize + Deserialize` records. No business logic lives here;
//! lifecycle rules and access checks are in `envmon-workflow`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ProformaStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a proforma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProformaStatus {
    NotAssigned,
    Assigned,
    InProgress,
    SentForReview,
    Submitted,
    Reopened,
}

impl ProformaStatus {
    pub const ALL: [ProformaStatus; 6] = [
        ProformaStatus::NotAssigned,
        ProformaStatus::Assigned,
        ProformaStatus::InProgress,
        ProformaStatus::SentForReview,
        ProformaStatus::Submitted,
        ProformaStatus::Reopened,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProformaStatus::NotAssigned => "not_assigned",
            ProformaStatus::Assigned => "assigned",
            ProformaStatus::InProgress => "in_progress",
            ProformaStatus::SentForReview => "sent_for_review",
            ProformaStatus::Submitted => "submitted",
            ProformaStatus::Reopened => "reopened",
        }
    }

    /// Parse the wire name (`"sent_for_review"`); case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|st| st.as_str() == wanted)
    }
}

impl fmt::Display for ProformaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
}

/// A typed column definition of a proforma.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProformaField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Allowed values; only meaningful for `select` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Review sub-status of a single row, independent of the parent proforma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Draft,
    Submitted,
    Reviewed,
    Approved,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Draft => "draft",
            RowStatus::Submitted => "submitted",
            RowStatus::Reviewed => "reviewed",
            RowStatus::Approved => "approved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProformaComment {
    pub id: Uuid,
    pub row_id: String,
    pub field_id: String,
    pub comment: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Saved aggregate result. Appended to a row and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathCalculation {
    pub id: Uuid,
    /// e.g. `"average(CO2 Level (ppm))"`
    pub formula: String,
    pub result: f64,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProformaRow {
    pub id: String,
    /// field id -> cell value
    pub data: BTreeMap<String, Value>,
    #[serde(default)]
    pub comments: Vec<ProformaComment>,
    #[serde(default)]
    pub calculations: Vec<MathCalculation>,
    pub status: RowStatus,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ProformaRow {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: BTreeMap::new(),
            comments: Vec::new(),
            calculations: Vec::new(),
            status: RowStatus::Draft,
            submitted_by: None,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Proforma
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proforma {
    pub id: String,
    pub title: String,
    pub description: String,
    pub department: String,
    pub segment: String,
    pub fields: Vec<ProformaField>,
    pub rows: Vec<ProformaRow>,
    pub assigned_to: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: ProformaStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reopened_by: Option<String>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
}

impl Proforma {
    pub fn field(&self, field_id: &str) -> Option<&ProformaField> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    pub fn row(&self, row_id: &str) -> Option<&ProformaRow> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    pub fn row_mut(&mut self, row_id: &str) -> Option<&mut ProformaRow> {
        self.rows.iter_mut().find(|r| r.id == row_id)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "Concern Staff")]
    ConcernStaff,
    #[serde(rename = "SSE")]
    Sse,
    #[serde(rename = "BO")]
    Bo,
    #[serde(rename = "WPO")]
    Wpo,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::ConcernStaff => "Concern Staff",
            UserRole::Sse => "SSE",
            UserRole::Bo => "BO",
            UserRole::Wpo => "WPO",
        }
    }

    /// Accepts the display name or a compact alias (`concern_staff`, `sse`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "concern staff" | "staff" => Some(UserRole::ConcernStaff),
            "sse" => Some(UserRole::Sse),
            "bo" => Some(UserRole::Bo),
            "wpo" => Some(UserRole::Wpo),
            _ => None,
        }
    }

    /// SSE and BO review, comment, and run calculations.
    pub fn is_reviewer(&self) -> bool {
        matches!(self, UserRole::Sse | UserRole::Bo)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard visibility: none, own department, or everything.
///
/// On the wire this keeps the dashboard's original shape: `false`, `"dept"`
/// or `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VisibilityRepr", into = "VisibilityRepr")]
pub enum DashboardVisibility {
    None,
    Department,
    All,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum VisibilityRepr {
    Flag(bool),
    Scope(String),
}

impl TryFrom<VisibilityRepr> for DashboardVisibility {
    type Error = String;

    fn try_from(v: VisibilityRepr) -> Result<Self, Self::Error> {
        match v {
            VisibilityRepr::Flag(true) => Ok(DashboardVisibility::All),
            VisibilityRepr::Flag(false) => Ok(DashboardVisibility::None),
            VisibilityRepr::Scope(s) if s == "dept" => Ok(DashboardVisibility::Department),
            VisibilityRepr::Scope(other) => Err(format!(
                "invalid dashboard visibility '{other}'; expected true, false or \"dept\""
            )),
        }
    }
}

impl From<DashboardVisibility> for VisibilityRepr {
    fn from(v: DashboardVisibility) -> Self {
        match v {
            DashboardVisibility::None => VisibilityRepr::Flag(false),
            DashboardVisibility::Department => VisibilityRepr::Scope("dept".to_string()),
            DashboardVisibility::All => VisibilityRepr::Flag(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissions {
    pub fill_proforma: bool,
    pub review_edit_comment: bool,
    pub submit_final_proforma: bool,
    pub reopen_proforma: bool,
    pub generate_segment_report: bool,
    pub generate_dept_report: bool,
    pub generate_env_consolidated: bool,
    pub view_all_dashboards: DashboardVisibility,
    pub upload_iso_certificate: bool,
    pub receive_iso_renewal_alert: bool,
}

impl UserPermissions {
    /// Nothing granted.
    pub fn none() -> Self {
        Self {
            fill_proforma: false,
            review_edit_comment: false,
            submit_final_proforma: false,
            reopen_proforma: false,
            generate_segment_report: false,
            generate_dept_report: false,
            generate_env_consolidated: false,
            view_all_dashboards: DashboardVisibility::None,
            upload_iso_certificate: false,
            receive_iso_renewal_alert: false,
        }
    }

    /// Default grant for a freshly created user of `role`.
    pub fn for_role(role: UserRole) -> Self {
        match role {
            UserRole::ConcernStaff => Self {
                fill_proforma: true,
                ..Self::none()
            },
            UserRole::Sse | UserRole::Bo => Self {
                review_edit_comment: true,
                submit_final_proforma: true,
                generate_segment_report: true,
                generate_dept_report: true,
                view_all_dashboards: DashboardVisibility::Department,
                upload_iso_certificate: true,
                receive_iso_renewal_alert: true,
                ..Self::none()
            },
            UserRole::Wpo => Self {
                reopen_proforma: true,
                generate_env_consolidated: true,
                view_all_dashboards: DashboardVisibility::All,
                upload_iso_certificate: true,
                receive_iso_renewal_alert: true,
                ..Self::none()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub department: String,
    pub permissions: UserPermissions,
}

impl User {
    /// Build a user with the role's default permissions.
    pub fn with_role_defaults(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        role: UserRole,
        department: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            role,
            department: department.into(),
            permissions: UserPermissions::for_role(role),
        }
    }

    /// `"Sarah Johnson (SSE)"`, the attribution string stamped on records.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.role)
    }
}

// ---------------------------------------------------------------------------
// ISO certificates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsoCertificate {
    pub id: String,
    pub name: String,
    pub department: String,
    pub uploaded_by: String,
    pub upload_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub file_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names_round_trip_through_parse() {
        for st in ProformaStatus::ALL {
            assert_eq!(ProformaStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(
            serde_json::to_value(ProformaStatus::SentForReview).unwrap(),
            serde_json::json!("sent_for_review")
        );
        assert_eq!(ProformaStatus::parse("pending_review"), None);
    }

    #[test]
    fn role_serializes_with_display_names() {
        assert_eq!(
            serde_json::to_value(UserRole::ConcernStaff).unwrap(),
            serde_json::json!("Concern Staff")
        );
        assert_eq!(UserRole::parse("concern_staff"), Some(UserRole::ConcernStaff));
        assert_eq!(UserRole::parse("WPO"), Some(UserRole::Wpo));
        assert_eq!(UserRole::parse("admin"), None);
    }

    #[test]
    fn dashboard_visibility_keeps_bool_or_dept_shape() {
        let p = UserPermissions::for_role(UserRole::Sse);
        let v = serde_json::to_value(p).unwrap();
        assert_eq!(v["view_all_dashboards"], serde_json::json!("dept"));

        let wpo = serde_json::to_value(UserPermissions::for_role(UserRole::Wpo)).unwrap();
        assert_eq!(wpo["view_all_dashboards"], serde_json::json!(true));

        let back: UserPermissions = serde_json::from_value(v).unwrap();
        assert_eq!(back.view_all_dashboards, DashboardVisibility::Department);

        let bad: Result<DashboardVisibility, _> = serde_json::from_str("\"team\"");
        assert!(bad.is_err());
    }

    #[test]
    fn role_defaults_match_dashboard_matrix() {
        let staff = UserPermissions::for_role(UserRole::ConcernStaff);
        assert!(staff.fill_proforma);
        assert!(!staff.review_edit_comment);

        let bo = UserPermissions::for_role(UserRole::Bo);
        assert!(bo.submit_final_proforma);
        assert!(!bo.reopen_proforma);

        let wpo = UserPermissions::for_role(UserRole::Wpo);
        assert!(wpo.reopen_proforma);
        assert!(wpo.generate_env_consolidated);
        assert!(!wpo.submit_final_proforma);
    }

    #[test]
    fn field_type_uses_type_key() {
        let f: ProformaField = serde_json::from_str(
            r#"{"id":"co2","name":"CO2 Level (ppm)","type":"number","required":true}"#,
        )
        .unwrap();
        assert_eq!(f.field_type, FieldType::Number);
        assert!(f.options.is_none());
    }
}
