// src/routes/leads.rs

use axum::{extract::{Path, Query, State}, Json};
use serde::{Deserialize, Serialize};

use crate::{AppState, models::{Assignment, DistributionOutcome, DistributionStrategy, DraftLead, Lead, LeadStatus}};
use crate::services::leads::{self, NewLead};
use crate::services::parser::parse_leads_from_text;
use super::api_error;

#[derive(Deserialize)]
pub struct CreateLeadBody {
    #[serde(flatten)]
    pub lead: NewLead,
    /// Employee taking the lead on creation ("Self-Assigned"). At their
    /// daily target the lead is still created, with no assignment.
    pub assign_to: Option<i64>,
}

#[derive(Serialize)]
pub struct CreatedLead {
    pub lead: Lead,
    pub assignment: Option<Assignment>,
}

#[derive(Deserialize)]
pub struct ListLeadsQ {
    pub status: Option<LeadStatus>,
}

#[derive(Deserialize)]
pub struct PatchStatusBody {
    pub status: LeadStatus,
    pub actor_id: i64,
}

#[derive(Serialize)]
pub struct StatusChange {
    pub id: i64,
    pub old_status: LeadStatus,
    pub status: LeadStatus,
}

#[derive(Deserialize)]
pub struct PasteBody {
    pub text: String,
}

#[derive(Deserialize)]
pub struct DumpBody {
    pub text: String,
    pub strategy: DistributionStrategy,
    pub requested_by: i64,
}

/// POST /api/v1/leads
pub async fn create_lead(
    State(state): State<AppState>,
    Json(b): Json<CreateLeadBody>,
) -> Result<Json<CreatedLead>, (axum::http::StatusCode, String)> {
    let store = state.store.as_ref();
    let created = match b.assign_to {
        Some(employee_id) => {
            let (lead, assignment) = leads::add_manual_lead(store, &state.ledger, b.lead, employee_id)
                .await
                .map_err(api_error)?;
            CreatedLead { lead, assignment }
        }
        None => CreatedLead {
            lead: leads::create_lead(store, b.lead).await.map_err(api_error)?,
            assignment: None,
        },
    };
    Ok(Json(created))
}

/// GET /api/v1/leads
pub async fn list_leads(
    State(state): State<AppState>,
    Query(q): Query<ListLeadsQ>,
) -> Result<Json<Vec<Lead>>, (axum::http::StatusCode, String)> {
    let mut rows = leads::list_leads(state.store.as_ref()).await.map_err(api_error)?;
    if let Some(status) = q.status {
        rows.retain(|l| l.status == status);
    }
    Ok(Json(rows))
}

/// GET /api/v1/employees/:id/leads
pub async fn list_employee_leads(
    State(state): State<AppState>,
    Path(employee_id): Path<i64>,
) -> Result<Json<Vec<Lead>>, (axum::http::StatusCode, String)> {
    let rows = leads::leads_for_employee(state.store.as_ref(), &state.ledger, employee_id)
        .await
        .map_err(api_error)?;
    Ok(Json(rows))
}

/// PATCH /api/v1/leads/:id/status
pub async fn patch_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(b): Json<PatchStatusBody>,
) -> Result<Json<StatusChange>, (axum::http::StatusCode, String)> {
    let old_status = leads::update_status(state.store.as_ref(), &state.audit, id, b.status, b.actor_id)
        .await
        .map_err(api_error)?;
    Ok(Json(StatusChange { id, old_status, status: b.status }))
}

/// POST /api/v1/leads/parse
pub async fn parse_leads(Json(b): Json<PasteBody>) -> Json<Vec<DraftLead>> {
    Json(parse_leads_from_text(&b.text))
}

/// POST /api/v1/leads/dump
pub async fn dump_leads(
    State(state): State<AppState>,
    Json(b): Json<DumpBody>,
) -> Result<Json<DistributionOutcome>, (axum::http::StatusCode, String)> {
    let outcome = leads::ingest_pasted_leads(
        state.store.as_ref(),
        &state.engine,
        &b.text,
        b.strategy,
        b.requested_by,
    )
    .await
    .map_err(api_error)?;
    Ok(Json(outcome))
}
