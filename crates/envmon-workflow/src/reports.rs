//! Segment, department and consolidated reports.
//!
//! A report folds every in-scope proforma into status counts plus one
//! [`Summary`] per number field name. Fields are matched by display name so
//! the same measurement collected under different field ids still lands in
//! one column.
//!
//! Reports only fold proformas the requester can see. A department report
//! on a department outside the requester's dashboard scope is refused.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use envmon_schemas::{FieldType, Proforma, ProformaStatus, User};
use envmon_stats::Summary;
use serde::{Deserialize, Serialize};

use crate::access::{authorize, department_visible, visible_to, AccessDenied, Action};
use crate::column::column_values;
use crate::error::DeskError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ReportScope {
    Segment(String),
    Department(String),
    Consolidated,
}

impl ReportScope {
    pub fn action(&self) -> Action {
        match self {
            ReportScope::Segment(_) => Action::GenerateSegmentReport,
            ReportScope::Department(_) => Action::GenerateDeptReport,
            ReportScope::Consolidated => Action::GenerateEnvConsolidated,
        }
    }

    pub fn includes(&self, p: &Proforma) -> bool {
        match self {
            ReportScope::Segment(s) => p.segment.eq_ignore_ascii_case(s.trim()),
            ReportScope::Department(d) => p.department.eq_ignore_ascii_case(d.trim()),
            ReportScope::Consolidated => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub field_name: String,
    pub samples: usize,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub scope: ReportScope,
    pub generated_by: String,
    pub generated_at: DateTime<Utc>,
    pub proforma_count: usize,
    pub status_counts: BTreeMap<ProformaStatus, usize>,
    /// Sorted by field name. Fields with no numeric samples are omitted.
    pub fields: Vec<FieldSummary>,
}

pub fn build_report<'a, I>(
    proformas: I,
    scope: ReportScope,
    requester: &User,
    now: DateTime<Utc>,
) -> Result<Report, DeskError>
where
    I: IntoIterator<Item = &'a Proforma>,
{
    authorize(requester, scope.action(), None)?;
    if let ReportScope::Segment(name) | ReportScope::Department(name) = &scope {
        if name.trim().is_empty() {
            return Err(DeskError::validation("report scope name is required"));
        }
    }
    if let ReportScope::Department(name) = &scope {
        if !department_visible(requester, name) {
            return Err(DeskError::Access(AccessDenied {
                user_id: requester.id.clone(),
                role: requester.role,
                action: scope.action(),
            }));
        }
    }

    let mut proforma_count = 0;
    let mut status_counts = BTreeMap::new();
    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for p in proformas
        .into_iter()
        .filter(|p| scope.includes(p) && visible_to(requester, p))
    {
        proforma_count += 1;
        *status_counts.entry(p.status).or_insert(0) += 1;

        for field in p.fields.iter().filter(|f| f.field_type == FieldType::Number) {
            columns
                .entry(field.name.clone())
                .or_default()
                .extend(column_values(p, &field.id));
        }
    }

    let fields = columns
        .into_iter()
        .filter_map(|(field_name, values)| {
            let summary = Summary::of(&values).ok()?;
            Some(FieldSummary {
                field_name,
                samples: values.len(),
                summary,
            })
        })
        .collect();

    Ok(Report {
        scope,
        generated_by: requester.display_name(),
        generated_at: now,
        proforma_count,
        status_counts,
        fields,
    })
}
