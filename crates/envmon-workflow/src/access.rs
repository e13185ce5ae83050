//! Role and permission gating for desk actions.
//!
//! Actions backed by a permission flag check the flag; the rest are gated
//! by role. Status only matters for row editing (staff lose edit rights
//! once a proforma is submitted).

use std::fmt;

use envmon_schemas::{DashboardVisibility, Proforma, ProformaStatus, User, UserRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateProforma,
    AssignProforma,
    EditRow,
    AddRow,
    Comment,
    UseMathFunctions,
    ReviewRow,
    SendForReview,
    SubmitFinal,
    Reopen,
    GenerateSegmentReport,
    GenerateDeptReport,
    GenerateEnvConsolidated,
    UploadIsoCertificate,
    ManageUsers,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateProforma => "create_proforma",
            Action::AssignProforma => "assign_proforma",
            Action::EditRow => "edit_row",
            Action::AddRow => "add_row",
            Action::Comment => "comment",
            Action::UseMathFunctions => "use_math_functions",
            Action::ReviewRow => "review_row",
            Action::SendForReview => "send_for_review",
            Action::SubmitFinal => "submit_final",
            Action::Reopen => "reopen",
            Action::GenerateSegmentReport => "generate_segment_report",
            Action::GenerateDeptReport => "generate_dept_report",
            Action::GenerateEnvConsolidated => "generate_env_consolidated",
            Action::UploadIsoCertificate => "upload_iso_certificate",
            Action::ManageUsers => "manage_users",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub user_id: String,
    pub role: UserRole,
    pub action: Action,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "access denied: user '{}' ({}) may not {}",
            self.user_id, self.role, self.action
        )
    }
}

impl std::error::Error for AccessDenied {}

/// Check whether `user` may perform `action` on a proforma in `status`.
///
/// `status` is ignored for actions that are not tied to a proforma.
pub fn authorize(
    user: &User,
    action: Action,
    status: Option<ProformaStatus>,
) -> Result<(), AccessDenied> {
    if is_allowed(user, action, status) {
        Ok(())
    } else {
        Err(AccessDenied {
            user_id: user.id.clone(),
            role: user.role,
            action,
        })
    }
}

pub fn is_allowed(user: &User, action: Action, status: Option<ProformaStatus>) -> bool {
    let role = user.role;
    let perms = &user.permissions;

    match action {
        Action::CreateProforma | Action::AssignProforma => {
            matches!(role, UserRole::Sse | UserRole::Bo | UserRole::Wpo)
        }
        Action::EditRow => match role {
            UserRole::Sse | UserRole::Bo => true,
            UserRole::ConcernStaff => status != Some(ProformaStatus::Submitted),
            UserRole::Wpo => false,
        },
        Action::AddRow => matches!(role, UserRole::ConcernStaff | UserRole::Sse | UserRole::Bo),
        Action::Comment | Action::UseMathFunctions => role.is_reviewer(),
        Action::ReviewRow => perms.review_edit_comment,
        Action::SendForReview => perms.fill_proforma,
        Action::SubmitFinal => perms.submit_final_proforma,
        Action::Reopen => perms.reopen_proforma,
        Action::GenerateSegmentReport => perms.generate_segment_report,
        Action::GenerateDeptReport => perms.generate_dept_report,
        Action::GenerateEnvConsolidated => perms.generate_env_consolidated,
        Action::UploadIsoCertificate => perms.upload_iso_certificate,
        Action::ManageUsers => role == UserRole::Wpo,
    }
}

/// Dashboard scoping: which proformas a user may see at all.
///
/// `All` sees everything; `Department` sees its own department (a user
/// whose department is `"All"` sees every department); `None` sees only
/// proformas it created or is assigned to.
pub fn visible_to(user: &User, proforma: &Proforma) -> bool {
    match user.permissions.view_all_dashboards {
        DashboardVisibility::None => {
            proforma.created_by == user.id || proforma.assigned_to.iter().any(|a| a == &user.id)
        }
        _ => department_visible(user, &proforma.department),
    }
}

/// Whether `user` sees every proforma of `department`. Users scoped to
/// their own work (`None`) see no department as a whole.
pub fn department_visible(user: &User, department: &str) -> bool {
    match user.permissions.view_all_dashboards {
        DashboardVisibility::All => true,
        DashboardVisibility::Department => {
            user.department.eq_ignore_ascii_case("all")
                || user.department.eq_ignore_ascii_case(department.trim())
        }
        DashboardVisibility::None => false,
    }
}
