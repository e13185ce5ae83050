//! In-memory proforma desk.
//!
//! Owns every proforma and its transition history. Each operation on an
//! existing proforma runs the same sequence: look up (a proforma the actor
//! may not see is reported as not found), authorize, check the lifecycle,
//! validate input, then mutate. A refused operation leaves the desk
//! unchanged.
//!
//! Applied transitions are also queued in an outbox; the host drains it with
//! [`ProformaDesk::take_transitions`] to forward them (audit log, event bus).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use envmon_schemas::{
    FieldType, MathCalculation, Proforma, ProformaComment, ProformaField, ProformaRow,
    ProformaStatus, RowStatus, User, UserRole,
};
use envmon_stats::AggregateFn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::access::{authorize, visible_to, AccessDenied, Action};
use crate::column::{column_values, is_blank, numeric_value};
use crate::error::DeskError;
use crate::lifecycle::{is_locked, next_status, LifecycleEvent, TransitionRecord};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewField {
    /// Derived from `name` when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProforma {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub department: String,
    pub segment: String,
    pub fields: Vec<NewField>,
    /// User ids. A non-empty list assigns the proforma on creation.
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Listing filter. Every set criterion must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProformaFilter {
    /// Case-insensitive substring of title, id, or department.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<ProformaStatus>,
    #[serde(default)]
    pub department: Option<String>,
}

impl ProformaFilter {
    pub fn matches(&self, p: &Proforma) -> bool {
        if let Some(q) = self.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            let hit = p.title.to_lowercase().contains(&q)
                || p.id.to_lowercase().contains(&q)
                || p.department.to_lowercase().contains(&q);
            if !hit {
                return false;
            }
        }
        if let Some(st) = self.status {
            if p.status != st {
                return false;
            }
        }
        if let Some(dept) = self.department.as_deref() {
            if !p.department.eq_ignore_ascii_case(dept.trim()) {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// ProformaDesk
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ProformaDesk {
    proformas: BTreeMap<String, Proforma>,
    history: BTreeMap<String, Vec<TransitionRecord>>,
    outbox: Vec<TransitionRecord>,
    seq: u64,
}

impl ProformaDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.proformas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proformas.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<&Proforma, DeskError> {
        self.proformas
            .get(id)
            .ok_or_else(|| DeskError::not_found("proforma", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proforma> {
        self.proformas.values()
    }

    /// Proformas matching `filter`, in id order.
    pub fn list(&self, filter: &ProformaFilter) -> Vec<&Proforma> {
        self.proformas.values().filter(|p| filter.matches(p)).collect()
    }

    /// Like [`list`](Self::list) but restricted to what `viewer` may see.
    pub fn list_for(&self, viewer: &User, filter: &ProformaFilter) -> Vec<&Proforma> {
        self.proformas
            .values()
            .filter(|p| visible_to(viewer, p) && filter.matches(p))
            .collect()
    }

    pub fn history(&self, id: &str) -> Result<&[TransitionRecord], DeskError> {
        self.get(id)?;
        Ok(self.history.get(id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Drain transitions applied since the last call.
    pub fn take_transitions(&mut self) -> Vec<TransitionRecord> {
        std::mem::take(&mut self.outbox)
    }

    // -----------------------------------------------------------------------
    // Creation and assignment
    // -----------------------------------------------------------------------

    pub fn create(
        &mut self,
        draft: NewProforma,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<&Proforma, DeskError> {
        authorize(actor, Action::CreateProforma, None)?;

        let title = required_text("title", &draft.title)?;
        let department = required_text("department", &draft.department)?;
        let segment = required_text("segment", &draft.segment)?;
        let fields = build_fields(draft.fields)?;
        let assignees = normalize_assignees(&draft.assigned_to);

        let id = format!("PF-{:06}", self.seq + 1);

        let proforma = Proforma {
            id: id.clone(),
            title,
            description: draft.description.trim().to_string(),
            department,
            segment,
            fields,
            rows: Vec::new(),
            assigned_to: Vec::new(),
            created_by: actor.id.clone(),
            created_at: now,
            deadline: draft.deadline,
            status: ProformaStatus::NotAssigned,
            submitted_at: None,
            reopened_by: None,
            reopened_at: None,
            last_modified_at: None,
            last_modified_by: None,
        };
        // Creators only file proformas for departments they can see.
        if !visible_to(actor, &proforma) {
            return Err(DeskError::Access(AccessDenied {
                user_id: actor.id.clone(),
                role: actor.role,
                action: Action::CreateProforma,
            }));
        }
        self.seq += 1;
        self.proformas.insert(id.clone(), proforma);
        debug!(proforma_id = %id, actor = %actor.id, "proforma created");

        if !assignees.is_empty() {
            self.assign(&id, &assignees, actor, now)?;
        }

        self.get(&id)
    }

    pub fn assign(
        &mut self,
        id: &str,
        assignees: &[String],
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, DeskError> {
        let status = self.visible(id, actor)?.status;
        authorize(actor, Action::AssignProforma, Some(status))?;
        let to = next_status(status, LifecycleEvent::Assign)?;

        let assignees = normalize_assignees(assignees);
        if assignees.is_empty() {
            return Err(DeskError::validation("at least one assignee is required"));
        }

        let p = self.proforma_mut(id)?;
        p.assigned_to = assignees;
        touch(p, actor, now);
        Ok(self.record(id, status, to, LifecycleEvent::Assign, actor, now))
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Append an empty draft row. Returns the new row id.
    pub fn add_row(
        &mut self,
        id: &str,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<String, DeskError> {
        let p = self.visible(id, actor)?;
        let status = p.status;
        authorize(actor, Action::AddRow, Some(status))?;
        ensure_unlocked(p)?;
        ensure_assigned_if_staff(p, actor, Action::AddRow)?;
        let to = next_status(status, LifecycleEvent::RowEdited)?;

        let p = self.proforma_mut(id)?;
        let row_id = format!("row-{}", p.rows.len() + 1);
        p.rows.push(ProformaRow::empty(row_id.clone()));
        touch(p, actor, now);
        self.record(id, status, to, LifecycleEvent::RowEdited, actor, now);
        Ok(row_id)
    }

    /// Merge `values` (field id → cell) into a row. A `null` clears a cell.
    pub fn update_row(
        &mut self,
        id: &str,
        row_id: &str,
        values: BTreeMap<String, Value>,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<&ProformaRow, DeskError> {
        let p = self.visible(id, actor)?;
        let status = p.status;
        authorize(actor, Action::EditRow, Some(status))?;
        ensure_unlocked(p)?;
        ensure_assigned_if_staff(p, actor, Action::EditRow)?;
        if p.row(row_id).is_none() {
            return Err(DeskError::not_found("row", row_id));
        }
        if values.is_empty() {
            return Err(DeskError::validation("no values to update"));
        }
        for (field_id, value) in &values {
            let field = p
                .field(field_id)
                .ok_or_else(|| DeskError::validation(format!("unknown field '{field_id}'")))?;
            validate_cell(field, value)?;
        }
        let to = next_status(status, LifecycleEvent::RowEdited)?;

        let p = self.proforma_mut(id)?;
        if let Some(row) = p.row_mut(row_id) {
            for (field_id, value) in values {
                if value.is_null() {
                    row.data.remove(&field_id);
                } else {
                    row.data.insert(field_id, value);
                }
            }
        }
        touch(p, actor, now);
        self.record(id, status, to, LifecycleEvent::RowEdited, actor, now);

        self.get(id)?
            .row(row_id)
            .ok_or_else(|| DeskError::not_found("row", row_id))
    }

    pub fn add_comment(
        &mut self,
        id: &str,
        row_id: &str,
        field_id: &str,
        text: &str,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<ProformaComment, DeskError> {
        let p = self.visible(id, actor)?;
        authorize(actor, Action::Comment, Some(p.status))?;
        ensure_unlocked(p)?;
        if p.row(row_id).is_none() {
            return Err(DeskError::not_found("row", row_id));
        }
        if p.field(field_id).is_none() {
            return Err(DeskError::not_found("field", field_id));
        }
        let text = required_text("comment", text)?;

        let comment = ProformaComment {
            id: Uuid::new_v4(),
            row_id: row_id.to_string(),
            field_id: field_id.to_string(),
            comment: text,
            author: actor.display_name(),
            created_at: now,
        };

        let row = self.row_mut(id, row_id)?;
        row.comments.push(comment.clone());
        Ok(comment)
    }

    /// Set a row's review sub-status. Only `reviewed` and `approved` are
    /// reviewer decisions; `submitted` is set by sending for review.
    pub fn review_row(
        &mut self,
        id: &str,
        row_id: &str,
        decision: RowStatus,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<&ProformaRow, DeskError> {
        let p = self.visible(id, actor)?;
        authorize(actor, Action::ReviewRow, Some(p.status))?;
        ensure_unlocked(p)?;
        if !matches!(decision, RowStatus::Reviewed | RowStatus::Approved) {
            return Err(DeskError::validation(format!(
                "row review decision must be reviewed or approved, got {}",
                decision.as_str()
            )));
        }

        let row = self.row_mut(id, row_id)?;
        row.status = decision;
        row.reviewed_by = Some(actor.display_name());
        row.reviewed_at = Some(now);
        debug!(proforma_id = %id, row_id, decision = decision.as_str(), "row reviewed");

        self.get(id)?
            .row(row_id)
            .ok_or_else(|| DeskError::not_found("row", row_id))
    }

    // -----------------------------------------------------------------------
    // Calculations
    // -----------------------------------------------------------------------

    /// Aggregate a number field across all rows. Non-numeric cells are
    /// skipped. Refused while the proforma is locked.
    pub fn calculate(
        &self,
        id: &str,
        field_id: &str,
        func: AggregateFn,
        actor: &User,
    ) -> Result<f64, DeskError> {
        let p = self.visible(id, actor)?;
        authorize(actor, Action::UseMathFunctions, Some(p.status))?;
        ensure_unlocked(p)?;
        let field = number_field(p, field_id)?;
        let values = column_values(p, &field.id);
        Ok(envmon_stats::apply(func, &values)?)
    }

    /// Compute and append a calculation to `row_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn save_calculation(
        &mut self,
        id: &str,
        row_id: &str,
        field_id: &str,
        func: AggregateFn,
        description: Option<&str>,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<MathCalculation, DeskError> {
        let result = self.calculate(id, field_id, func, actor)?;

        let p = self.get(id)?;
        if p.row(row_id).is_none() {
            return Err(DeskError::not_found("row", row_id));
        }
        let field_name = number_field(p, field_id)?.name.clone();

        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{func} calculation on {field_name}"));

        let calc = MathCalculation {
            id: Uuid::new_v4(),
            formula: func.formula(&field_name),
            result,
            applied_by: actor.display_name(),
            applied_at: now,
            description,
        };

        let row = self.row_mut(id, row_id)?;
        row.calculations.push(calc.clone());
        debug!(proforma_id = %id, row_id, formula = %calc.formula, "calculation saved");
        Ok(calc)
    }

    // -----------------------------------------------------------------------
    // Review lifecycle
    // -----------------------------------------------------------------------

    /// Hand the proforma to reviewers. Every row must have its required
    /// fields filled; draft rows become `submitted`.
    pub fn send_for_review(
        &mut self,
        id: &str,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, DeskError> {
        let p = self.visible(id, actor)?;
        let status = p.status;
        authorize(actor, Action::SendForReview, Some(status))?;
        ensure_assigned_if_staff(p, actor, Action::SendForReview)?;
        let to = next_status(status, LifecycleEvent::SendForReview)?;
        ensure_complete(p)?;

        let submitter = actor.display_name();
        let p = self.proforma_mut(id)?;
        for row in p.rows.iter_mut().filter(|r| r.status == RowStatus::Draft) {
            row.status = RowStatus::Submitted;
            row.submitted_by = Some(submitter.clone());
            row.submitted_at = Some(now);
        }
        touch(p, actor, now);
        Ok(self.record(id, status, to, LifecycleEvent::SendForReview, actor, now))
    }

    pub fn submit(
        &mut self,
        id: &str,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, DeskError> {
        let status = self.visible(id, actor)?.status;
        authorize(actor, Action::SubmitFinal, Some(status))?;
        let to = next_status(status, LifecycleEvent::Submit)?;

        let p = self.proforma_mut(id)?;
        p.submitted_at = Some(now);
        touch(p, actor, now);
        Ok(self.record(id, status, to, LifecycleEvent::Submit, actor, now))
    }

    pub fn reopen(
        &mut self,
        id: &str,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, DeskError> {
        let status = self.visible(id, actor)?.status;
        authorize(actor, Action::Reopen, Some(status))?;
        let to = next_status(status, LifecycleEvent::Reopen)?;

        let p = self.proforma_mut(id)?;
        p.reopened_by = Some(actor.display_name());
        p.reopened_at = Some(now);
        touch(p, actor, now);
        Ok(self.record(id, status, to, LifecycleEvent::Reopen, actor, now))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn visible(&self, id: &str, actor: &User) -> Result<&Proforma, DeskError> {
        let p = self.get(id)?;
        if !visible_to(actor, p) {
            return Err(DeskError::not_found("proforma", id));
        }
        Ok(p)
    }

    fn proforma_mut(&mut self, id: &str) -> Result<&mut Proforma, DeskError> {
        self.proformas
            .get_mut(id)
            .ok_or_else(|| DeskError::not_found("proforma", id))
    }

    fn row_mut(&mut self, id: &str, row_id: &str) -> Result<&mut ProformaRow, DeskError> {
        self.proforma_mut(id)?
            .row_mut(row_id)
            .ok_or_else(|| DeskError::not_found("row", row_id))
    }

    // Status is written here and only here.
    fn record(
        &mut self,
        id: &str,
        from: ProformaStatus,
        to: ProformaStatus,
        event: LifecycleEvent,
        actor: &User,
        now: DateTime<Utc>,
    ) -> TransitionRecord {
        if let Some(p) = self.proformas.get_mut(id) {
            p.status = to;
        }
        let rec = TransitionRecord {
            proforma_id: id.to_string(),
            from,
            to,
            event,
            actor: actor.id.clone(),
            at: now,
        };
        debug!(proforma_id = %id, %from, %to, %event, actor = %actor.id, "transition applied");
        self.history
            .entry(id.to_string())
            .or_default()
            .push(rec.clone());
        self.outbox.push(rec.clone());
        rec
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn required_text(name: &str, raw: &str) -> Result<String, DeskError> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(DeskError::validation(format!("{name} is required")));
    }
    Ok(t.to_string())
}

fn normalize_assignees(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.to_string()))
        .map(str::to_string)
        .collect()
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        "field".to_string()
    } else {
        out
    }
}

fn build_fields(raw: Vec<NewField>) -> Result<Vec<ProformaField>, DeskError> {
    if raw.is_empty() {
        return Err(DeskError::validation("at least one data field is required"));
    }

    let mut ids = BTreeSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for f in raw {
        let name = required_text("field name", &f.name)?;

        let base = match f.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(explicit) => {
                if ids.contains(explicit) {
                    return Err(DeskError::validation(format!(
                        "duplicate field id '{explicit}'"
                    )));
                }
                explicit.to_string()
            }
            None => slug(&name),
        };
        let mut id = base.clone();
        let mut n = 2;
        while ids.contains(&id) {
            id = format!("{base}_{n}");
            n += 1;
        }
        ids.insert(id.clone());

        let options = match f.field_type {
            FieldType::Select => {
                let opts: Vec<String> = f
                    .options
                    .unwrap_or_default()
                    .iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect();
                if opts.is_empty() {
                    return Err(DeskError::validation(format!(
                        "select field '{name}' needs at least one option"
                    )));
                }
                Some(opts)
            }
            _ => None,
        };

        out.push(ProformaField {
            id,
            name,
            field_type: f.field_type,
            required: f.required,
            options,
        });
    }
    Ok(out)
}

fn validate_cell(field: &ProformaField, value: &Value) -> Result<(), DeskError> {
    if is_blank(value) {
        return Ok(());
    }
    let bad = |expected: &str| {
        DeskError::validation(format!(
            "field '{}' expects {expected}, got {value}",
            field.name
        ))
    };
    match field.field_type {
        FieldType::Number => {
            numeric_value(value).ok_or_else(|| bad("a number"))?;
        }
        FieldType::Date => {
            let s = value.as_str().ok_or_else(|| bad("a date"))?.trim();
            let ok = DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok();
            if !ok {
                return Err(bad("a date (YYYY-MM-DD or RFC 3339)"));
            }
        }
        FieldType::Select => {
            let s = value.as_str().ok_or_else(|| bad("one of the options"))?;
            let allowed = field.options.as_deref().unwrap_or(&[]);
            if !allowed.iter().any(|o| o == s.trim()) {
                return Err(bad("one of the options"));
            }
        }
        FieldType::Text => {
            if value.is_object() || value.is_array() {
                return Err(bad("text"));
            }
        }
    }
    Ok(())
}

fn number_field<'a>(p: &'a Proforma, field_id: &str) -> Result<&'a ProformaField, DeskError> {
    let field = p
        .field(field_id)
        .ok_or_else(|| DeskError::not_found("field", field_id))?;
    if field.field_type != FieldType::Number {
        return Err(DeskError::validation(format!(
            "field '{}' is not a number field",
            field.name
        )));
    }
    Ok(field)
}

fn ensure_unlocked(p: &Proforma) -> Result<(), DeskError> {
    if is_locked(p.status) {
        return Err(DeskError::Locked {
            proforma_id: p.id.clone(),
        });
    }
    Ok(())
}

// Staff only work on proformas they are assigned to.
fn ensure_assigned_if_staff(p: &Proforma, actor: &User, action: Action) -> Result<(), DeskError> {
    if actor.role == UserRole::ConcernStaff && !p.assigned_to.iter().any(|a| a == &actor.id) {
        return Err(DeskError::Access(AccessDenied {
            user_id: actor.id.clone(),
            role: actor.role,
            action,
        }));
    }
    Ok(())
}

fn ensure_complete(p: &Proforma) -> Result<(), DeskError> {
    if p.rows.is_empty() {
        return Err(DeskError::validation(format!(
            "proforma '{}' has no rows to review",
            p.id
        )));
    }
    for (i, row) in p.rows.iter().enumerate() {
        for field in p.fields.iter().filter(|f| f.required) {
            let filled = row.data.get(&field.id).map(|v| !is_blank(v)).unwrap_or(false);
            if !filled {
                return Err(DeskError::validation(format!(
                    "row {} is missing required field '{}'",
                    i + 1,
                    field.name
                )));
            }
        }
    }
    Ok(())
}

fn touch(p: &mut Proforma, actor: &User, now: DateTime<Utc>) {
    p.last_modified_at = Some(now);
    p.last_modified_by = Some(actor.display_name());
}
