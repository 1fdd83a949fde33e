// src/routes/assignments.rs

use axum::{extract::{Path, Query, State}, Json};
use serde::{Deserialize, Serialize};

use crate::{AppState, db::{self, Filter}, models::Assignment};
use super::{api_error, internal_error};

#[derive(Deserialize)]
pub struct AssignBody {
    pub lead_id: i64,
    pub employee_id: i64,
    pub assigned_by: String,
}

#[derive(Deserialize)]
pub struct ListQ {
    pub lead_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Serialize)]
pub struct TodayCount {
    pub employee_id: i64,
    pub active_today: usize,
}

/// POST /api/v1/assignments
pub async fn create_assignment(
    State(state): State<AppState>,
    Json(b): Json<AssignBody>,
) -> Result<Json<Assignment>, (axum::http::StatusCode, String)> {
    let row = state
        .ledger
        .assign(b.lead_id, b.employee_id, &b.assigned_by)
        .await
        .map_err(api_error)?;
    Ok(Json(row))
}

/// GET /api/v1/assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    Query(q): Query<ListQ>,
) -> Result<Json<Vec<Assignment>>, (axum::http::StatusCode, String)> {
    let mut filter = Filter::new();
    if let Some(lead_id) = q.lead_id {
        filter = filter.eq("lead_id", lead_id);
    }
    if let Some(employee_id) = q.employee_id {
        filter = filter.eq("assigned_to", employee_id);
    }
    if let Some(active) = q.active {
        filter = filter.eq("active", active);
    }
    let rows: Vec<Assignment> = db::query_as(state.store.as_ref(), &filter)
        .await
        .map_err(internal_error)?;
    Ok(Json(rows))
}

/// GET /api/v1/employees/:id/assignments/today
pub async fn today_count(
    State(state): State<AppState>,
    Path(employee_id): Path<i64>,
) -> Result<Json<TodayCount>, (axum::http::StatusCode, String)> {
    let active_today = state
        .ledger
        .active_assignments_today(employee_id)
        .await
        .map_err(api_error)?;
    Ok(Json(TodayCount { employee_id, active_today }))
}
