// src/routes/distributions.rs

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{AppState, db, error::CrmError, models::{DistributionOutcome, DistributionStrategy, Lead}};
use super::{api_error, internal_error};

#[derive(Deserialize)]
pub struct DistributeBody {
    pub lead_ids: Vec<i64>,
    pub strategy: DistributionStrategy,
    pub requested_by: i64,
}

/// POST /api/v1/distributions
///
/// Leads are handed out in the order given. Unknown ids reject the whole
/// request before anything is written.
pub async fn distribute(
    State(state): State<AppState>,
    Json(b): Json<DistributeBody>,
) -> Result<Json<DistributionOutcome>, (axum::http::StatusCode, String)> {
    let mut leads: Vec<Lead> = Vec::with_capacity(b.lead_ids.len());
    for id in &b.lead_ids {
        let lead = db::fetch::<Lead>(state.store.as_ref(), *id)
            .await
            .map_err(internal_error)?
            .ok_or(CrmError::NotFound { entity: "lead", id: *id })
            .map_err(api_error)?;
        leads.push(lead);
    }

    let outcome = state
        .engine
        .distribute(&leads, b.strategy, b.requested_by)
        .await
        .map_err(api_error)?;
    Ok(Json(outcome))
}
