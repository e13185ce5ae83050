//! Scenario: Role gating across the desk.
//!
//! # Invariant under test
//!
//! Each role can reach exactly the operations its permissions grant. Staff
//! work only on proformas assigned to them, only SSE and BO comment and
//! calculate, and dashboard listings are scoped by `view_all_dashboards`.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use envmon_schemas::{FieldType, User, UserRole};
use envmon_stats::AggregateFn;
use envmon_workflow::{DeskError, NewField, NewProforma, ProformaDesk, ProformaFilter};
use serde_json::json;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn draft(dept: &str, assignees: &[&str]) -> NewProforma {
    NewProforma {
        title: format!("{dept} water"),
        description: String::new(),
        department: dept.into(),
        segment: "Environmental".into(),
        fields: vec![NewField {
            id: Some("ph".into()),
            name: "pH".into(),
            field_type: FieldType::Number,
            required: false,
            options: None,
        }],
        assigned_to: assignees.iter().map(|s| s.to_string()).collect(),
        deadline: None,
    }
}

#[test]
fn staff_cannot_create_or_touch_unassigned_work() {
    let staff = User::with_role_defaults("s1", "Staff One", "s1@x", UserRole::ConcernStaff, "Manufacturing");
    let other = User::with_role_defaults("s2", "Staff Two", "s2@x", UserRole::ConcernStaff, "Manufacturing");
    let bo = User::with_role_defaults("b1", "Branch Officer", "b1@x", UserRole::Bo, "Manufacturing");

    let mut desk = ProformaDesk::new();
    assert!(matches!(
        desk.create(draft("Manufacturing", &[]), &staff, t0()),
        Err(DeskError::Access(_))
    ));

    let id = desk
        .create(draft("Manufacturing", &["s1"]), &bo, t0())
        .unwrap()
        .id
        .clone();
    let row = desk.add_row(&id, &staff, t0()).unwrap();

    let vals = BTreeMap::from([("ph".to_string(), json!(7.1))]);
    // Unassigned staff cannot see the proforma at all.
    assert!(matches!(
        desk.update_row(&id, &row, vals.clone(), &other, t0()),
        Err(DeskError::NotFound { .. })
    ));
    desk.update_row(&id, &row, vals, &staff, t0()).unwrap();

    assert!(matches!(
        desk.add_comment(&id, &row, "ph", "looks fine", &staff, t0()),
        Err(DeskError::Access(_))
    ));
    assert!(matches!(
        desk.calculate(&id, "ph", AggregateFn::Sum, &staff),
        Err(DeskError::Access(_))
    ));
    assert_eq!(desk.calculate(&id, "ph", AggregateFn::Sum, &bo).unwrap(), 7.1);

    // Staff hold no submit permission.
    desk.send_for_review(&id, &staff, t0()).unwrap();
    assert!(matches!(desk.submit(&id, &staff, t0()), Err(DeskError::Access(_))));
    desk.submit(&id, &bo, t0()).unwrap();
}

#[test]
fn wpo_cannot_edit_rows_but_can_reopen() {
    let sse = User::with_role_defaults("r1", "Reviewer", "r1@x", UserRole::Sse, "Manufacturing");
    let wpo = User::with_role_defaults("w1", "Oversight", "w1@x", UserRole::Wpo, "All");

    let mut desk = ProformaDesk::new();
    let id = desk.create(draft("Manufacturing", &[]), &wpo, t0()).unwrap().id.clone();
    assert!(matches!(desk.add_row(&id, &wpo, t0()), Err(DeskError::Access(_))));

    let row = desk.add_row(&id, &sse, t0()).unwrap();
    assert!(matches!(
        desk.update_row(&id, &row, BTreeMap::from([("ph".to_string(), json!(6.5))]), &wpo, t0()),
        Err(DeskError::Access(_))
    ));
}

#[test]
fn listings_are_scoped_by_dashboard_visibility() {
    let sse = User::with_role_defaults("r1", "Reviewer", "r1@x", UserRole::Sse, "Manufacturing");
    let wpo = User::with_role_defaults("w1", "Oversight", "w1@x", UserRole::Wpo, "All");
    let staff = User::with_role_defaults("s1", "Staff", "s1@x", UserRole::ConcernStaff, "Electrical");

    let mut desk = ProformaDesk::new();
    desk.create(draft("Manufacturing", &[]), &wpo, t0()).unwrap();
    desk.create(draft("Electrical", &["s1"]), &wpo, t0()).unwrap();
    desk.create(draft("Electrical", &[]), &wpo, t0()).unwrap();

    let all = ProformaFilter::default();
    assert_eq!(desk.list_for(&wpo, &all).len(), 3);
    assert_eq!(desk.list_for(&sse, &all).len(), 1);
    assert_eq!(desk.list_for(&staff, &all).len(), 1);
}

#[test]
fn reviewers_cannot_reach_proformas_of_other_departments() {
    let mfg = User::with_role_defaults("r1", "Reviewer", "r1@x", UserRole::Sse, "Manufacturing");
    let elec = User::with_role_defaults("r2", "Other Reviewer", "r2@x", UserRole::Sse, "Electrical");
    let staff = User::with_role_defaults("s1", "Staff", "s1@x", UserRole::ConcernStaff, "Manufacturing");

    let mut desk = ProformaDesk::new();
    let id = desk
        .create(draft("Manufacturing", &["s1"]), &mfg, t0())
        .unwrap()
        .id
        .clone();
    let row = desk.add_row(&id, &staff, t0()).unwrap();
    desk.update_row(&id, &row, BTreeMap::from([("ph".to_string(), json!(7.0))]), &staff, t0())
        .unwrap();
    desk.send_for_review(&id, &staff, t0()).unwrap();
    let history_len = desk.history(&id).unwrap().len();

    let not_found = |r: Result<_, DeskError>| matches!(r, Err(DeskError::NotFound { kind: "proforma", .. }));
    assert!(not_found(desk.add_row(&id, &elec, t0()).map(|_| ())));
    assert!(not_found(
        desk.update_row(&id, &row, BTreeMap::from([("ph".to_string(), json!(9.9))]), &elec, t0())
            .map(|_| ())
    ));
    assert!(not_found(desk.calculate(&id, "ph", AggregateFn::Sum, &elec).map(|_| ())));
    assert!(not_found(
        desk.add_comment(&id, &row, "ph", "drift?", &elec, t0()).map(|_| ())
    ));
    assert!(not_found(
        desk.assign(&id, &["r2".to_string()], &elec, t0()).map(|_| ())
    ));
    assert!(not_found(desk.submit(&id, &elec, t0()).map(|_| ())));

    let p = desk.get(&id).unwrap();
    assert_eq!(p.rows[0].data["ph"], json!(7.0));
    assert!(p.rows[0].comments.is_empty());
    assert_eq!(desk.history(&id).unwrap().len(), history_len);

    desk.submit(&id, &mfg, t0()).unwrap();
}
