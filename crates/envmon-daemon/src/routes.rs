//! Axum router and all HTTP handlers for envmon-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers, so tests can drive the bare router.
//!
//! Every route except health and stream names its acting user in the
//! `x-user-id` header.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use envmon_schemas::{
    MathCalculation, Proforma, ProformaComment, ProformaRow, ProformaStatus, User, UserRole,
};
use envmon_stats::{format_result, AggregateFn};
use envmon_workflow::{
    authorize, build_report, visible_to, Action, NewCertificate, NewProforma, ProformaFilter,
    Report, TransitionRecord,
};
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{
        AssignRequest, CalculateRequest, CalculateResponse, CertificateView, CertificatesResponse,
        CommentRequest, HealthResponse, ListQuery, NewUserRequest, ReportRequest,
        ReviewRowRequest, SaveCalculationRequest, StatsRequest, StatsResponse, UpdateRowRequest,
    },
    error::ApiError,
    state::{AppState, BusMsg},
};

pub const ACTOR_HEADER: &str = "x-user-id";

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/users", get(list_users).post(create_user))
        .route("/v1/proformas", get(list_proformas).post(create_proforma))
        .route("/v1/proformas/:id", get(get_proforma))
        .route("/v1/proformas/:id/history", get(proforma_history))
        .route("/v1/proformas/:id/assign", post(assign_proforma))
        .route("/v1/proformas/:id/send-for-review", post(send_for_review))
        .route("/v1/proformas/:id/submit", post(submit_proforma))
        .route("/v1/proformas/:id/reopen", post(reopen_proforma))
        .route("/v1/proformas/:id/rows", post(add_row))
        .route("/v1/proformas/:id/rows/:row_id", put(update_row))
        .route("/v1/proformas/:id/rows/:row_id/comments", post(add_comment))
        .route("/v1/proformas/:id/rows/:row_id/review", post(review_row))
        .route(
            "/v1/proformas/:id/rows/:row_id/calculations",
            post(save_calculation),
        )
        .route("/v1/proformas/:id/calculate", post(calculate))
        .route("/v1/stats", post(stats))
        .route("/v1/reports", post(report))
        .route(
            "/v1/certificates",
            get(list_certificates).post(upload_certificate),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Actor resolution
// ---------------------------------------------------------------------------

async fn actor(st: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::unauthorized(format!("missing {ACTOR_HEADER} header")))?;

    st.users
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::unauthorized(format!("unknown user '{id}'")))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// /v1/users
// ---------------------------------------------------------------------------

pub(crate) async fn list_users(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<User>>> {
    actor(&st, &headers).await?;
    let users = st.users.read().await.values().cloned().collect();
    Ok(Json(users))
}

pub(crate) async fn create_user(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let who = actor(&st, &headers).await?;
    authorize(&who, Action::ManageUsers, None).map_err(envmon_workflow::DeskError::from)?;

    let role = UserRole::parse(&req.role)
        .ok_or_else(|| ApiError::validation(format!("unknown role '{}'", req.role)))?;
    let name = req.name.trim();
    let department = req.department.trim();
    if name.is_empty() || department.is_empty() {
        return Err(ApiError::validation("name and department are required"));
    }

    let user = {
        let mut users = st.users.write().await;
        let id = match req.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) if users.contains_key(id) => {
                return Err(ApiError::conflict(format!("user '{id}' already exists")));
            }
            Some(id) => id.to_string(),
            None => (users.len() + 1..)
                .map(|n| format!("USR-{n:03}"))
                .find(|id| !users.contains_key(id))
                .unwrap_or_default(),
        };

        let mut user = User::with_role_defaults(id, name, req.email.trim(), role, department);
        if let Some(p) = req.permissions {
            user.permissions = p;
        }
        users.insert(user.id.clone(), user.clone());
        user
    };

    info!(user_id = %user.id, role = %user.role, by = %who.id, "user created");
    st.audit_event(
        &user.id,
        "user",
        "created",
        json!({ "user": &user, "by": who.id }),
        Utc::now(),
    )
    .await;
    Ok((StatusCode::CREATED, Json(user)))
}

// ---------------------------------------------------------------------------
// /v1/proformas
// ---------------------------------------------------------------------------

pub(crate) async fn list_proformas(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<Proforma>>> {
    let who = actor(&st, &headers).await?;

    let status = match q.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            ProformaStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };
    let filter = ProformaFilter {
        search: q.q,
        status,
        department: q.department.filter(|d| !d.trim().is_empty()),
    };

    let desk = st.desk.read().await;
    let out = desk.list_for(&who, &filter).into_iter().cloned().collect();
    Ok(Json(out))
}

pub(crate) async fn create_proforma(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewProforma>,
) -> ApiResult<(StatusCode, Json<Proforma>)> {
    let who = actor(&st, &headers).await?;
    ensure_known_users(&st, &req.assigned_to).await?;

    let (created, records) = {
        let mut desk = st.desk.write().await;
        let created = desk.create(req, &who, Utc::now())?.clone();
        (created, desk.take_transitions())
    };

    info!(proforma_id = %created.id, by = %who.id, "proforma created");
    st.audit_event(
        &created.id,
        "proforma",
        "created",
        json!({ "title": created.title, "department": created.department, "by": who.id }),
        created.created_at,
    )
    .await;
    st.publish_transitions(records).await;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(crate) async fn get_proforma(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Proforma>> {
    let who = actor(&st, &headers).await?;
    let desk = st.desk.read().await;
    Ok(Json(visible(&desk, &who, &id)?.clone()))
}

pub(crate) async fn proforma_history(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TransitionRecord>>> {
    let who = actor(&st, &headers).await?;
    let desk = st.desk.read().await;
    visible(&desk, &who, &id)?;
    Ok(Json(desk.history(&id)?.to_vec()))
}

// A proforma the actor may not see is reported as missing.
fn visible<'a>(
    desk: &'a envmon_workflow::ProformaDesk,
    who: &User,
    id: &str,
) -> ApiResult<&'a Proforma> {
    let p = desk.get(id)?;
    if !visible_to(who, p) {
        return Err(ApiError::not_found(format!("proforma '{id}' not found")));
    }
    Ok(p)
}

async fn ensure_known_users(st: &AppState, ids: &[String]) -> ApiResult<()> {
    let users = st.users.read().await;
    if let Some(unknown) = ids
        .iter()
        .map(|s| s.trim())
        .find(|id| !id.is_empty() && !users.contains_key(*id))
    {
        return Err(ApiError::validation(format!("unknown assignee '{unknown}'")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub(crate) async fn assign_proforma(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Proforma>> {
    let who = actor(&st, &headers).await?;
    ensure_known_users(&st, &req.assigned_to).await?;
    lifecycle(&st, &id, |desk| desk.assign(&id, &req.assigned_to, &who, Utc::now())).await
}

pub(crate) async fn send_for_review(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Proforma>> {
    let who = actor(&st, &headers).await?;
    lifecycle(&st, &id, |desk| desk.send_for_review(&id, &who, Utc::now())).await
}

pub(crate) async fn submit_proforma(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Proforma>> {
    let who = actor(&st, &headers).await?;
    lifecycle(&st, &id, |desk| desk.submit(&id, &who, Utc::now())).await
}

pub(crate) async fn reopen_proforma(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Proforma>> {
    let who = actor(&st, &headers).await?;
    lifecycle(&st, &id, |desk| desk.reopen(&id, &who, Utc::now())).await
}

/// Run one lifecycle operation under the desk lock, then publish what it
/// applied and return the updated proforma.
async fn lifecycle<F>(st: &AppState, id: &str, op: F) -> ApiResult<Json<Proforma>>
where
    F: FnOnce(
        &mut envmon_workflow::ProformaDesk,
    ) -> Result<TransitionRecord, envmon_workflow::DeskError>,
{
    let (updated, records) = {
        let mut desk = st.desk.write().await;
        op(&mut *desk)?;
        (desk.get(id)?.clone(), desk.take_transitions())
    };
    st.publish_transitions(records).await;
    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

pub(crate) async fn add_row(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ProformaRow>)> {
    let who = actor(&st, &headers).await?;
    let (row, records) = {
        let mut desk = st.desk.write().await;
        let row_id = desk.add_row(&id, &who, Utc::now())?;
        let row = desk
            .get(&id)?
            .row(&row_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("row '{row_id}' not found")))?;
        (row, desk.take_transitions())
    };
    st.publish_transitions(records).await;
    Ok((StatusCode::CREATED, Json(row)))
}

pub(crate) async fn update_row(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, row_id)): Path<(String, String)>,
    Json(req): Json<UpdateRowRequest>,
) -> ApiResult<Json<ProformaRow>> {
    let who = actor(&st, &headers).await?;
    let (row, records) = {
        let mut desk = st.desk.write().await;
        let row = desk
            .update_row(&id, &row_id, req.values, &who, Utc::now())?
            .clone();
        (row, desk.take_transitions())
    };
    st.publish_transitions(records).await;
    Ok(Json(row))
}

pub(crate) async fn add_comment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, row_id)): Path<(String, String)>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<ProformaComment>)> {
    let who = actor(&st, &headers).await?;
    let comment = st.desk.write().await.add_comment(
        &id,
        &row_id,
        &req.field_id,
        &req.comment,
        &who,
        Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub(crate) async fn review_row(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, row_id)): Path<(String, String)>,
    Json(req): Json<ReviewRowRequest>,
) -> ApiResult<Json<ProformaRow>> {
    let who = actor(&st, &headers).await?;
    let row = st
        .desk
        .write()
        .await
        .review_row(&id, &row_id, req.decision, &who, Utc::now())?
        .clone();
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Calculations
// ---------------------------------------------------------------------------

pub(crate) async fn calculate(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CalculateRequest>,
) -> ApiResult<Json<CalculateResponse>> {
    let who = actor(&st, &headers).await?;
    let desk = st.desk.read().await;
    let result = desk.calculate(&id, &req.field_id, req.function, &who)?;
    let field_name = desk
        .get(&id)?
        .field(&req.field_id)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| req.field_id.clone());

    Ok(Json(CalculateResponse {
        formula: req.function.formula(&field_name),
        formatted: format_result(result, st.result_decimals),
        field_id: req.field_id,
        function: req.function,
        result,
    }))
}

pub(crate) async fn save_calculation(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, row_id)): Path<(String, String)>,
    Json(req): Json<SaveCalculationRequest>,
) -> ApiResult<(StatusCode, Json<MathCalculation>)> {
    let who = actor(&st, &headers).await?;
    let calc = st.desk.write().await.save_calculation(
        &id,
        &row_id,
        &req.field_id,
        req.function,
        req.description.as_deref(),
        &who,
        Utc::now(),
    )?;
    st.audit_event(
        &id,
        "calculation",
        "saved",
        json!({ "row_id": row_id, "formula": calc.formula, "result": calc.result, "by": who.id }),
        calc.applied_at,
    )
    .await;
    Ok((StatusCode::CREATED, Json(calc)))
}

// ---------------------------------------------------------------------------
// POST /v1/stats
// ---------------------------------------------------------------------------

pub(crate) async fn stats(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StatsRequest>,
) -> ApiResult<Json<StatsResponse>> {
    let who = actor(&st, &headers).await?;
    authorize(&who, Action::UseMathFunctions, None).map_err(envmon_workflow::DeskError::from)?;

    let function = AggregateFn::parse(&req.function)?;
    if let Some(bad) = req.values.iter().find(|v| !v.is_finite()) {
        return Err(ApiError::validation(format!("non-finite value {bad}")));
    }
    let result = envmon_stats::apply(function, &req.values)?;
    let decimals = req.decimals.unwrap_or(st.result_decimals);

    Ok(Json(StatsResponse {
        function,
        label: function.label().to_string(),
        count: req.values.len(),
        result,
        formatted: format_result(result, decimals),
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/reports
// ---------------------------------------------------------------------------

pub(crate) async fn report(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReportRequest>,
) -> ApiResult<Json<Report>> {
    let who = actor(&st, &headers).await?;
    let desk = st.desk.read().await;
    let report = build_report(desk.iter(), req.scope, &who, Utc::now())?;
    info!(by = %who.id, proformas = report.proforma_count, "report generated");
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// /v1/certificates
// ---------------------------------------------------------------------------

pub(crate) async fn list_certificates(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<CertificatesResponse>> {
    actor(&st, &headers).await?;
    let now = Utc::now();
    let reg = st.certificates.read().await;
    let certificates = reg
        .all()
        .iter()
        .map(|c| CertificateView {
            certificate: c.clone(),
            expiry: reg.info(c, now),
        })
        .collect();

    Ok(Json(CertificatesResponse {
        warning_days: reg.warning_days(),
        counts: reg.status_counts(now),
        certificates,
    }))
}

pub(crate) async fn upload_certificate(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewCertificate>,
) -> ApiResult<(StatusCode, Json<CertificateView>)> {
    let who = actor(&st, &headers).await?;
    let now = Utc::now();
    let view = {
        let mut reg = st.certificates.write().await;
        let cert = reg.upload(req, &who, now)?.clone();
        CertificateView {
            expiry: reg.info(&cert, now),
            certificate: cert,
        }
    };

    info!(cert_id = %view.certificate.id, status = %view.expiry.status, "certificate uploaded");
    st.audit_event(
        &view.certificate.id,
        "certificate",
        "uploaded",
        json!({ "certificate": &view.certificate, "by": who.id }),
        now,
    )
    .await;
    Ok((StatusCode::CREATED, Json(view)))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Proforma(_) => "proforma",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
