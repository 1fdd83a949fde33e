// src/routes/sales.rs

use axum::{extract::{Query, State}, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{AppState, db, models::Sale};
use crate::services::sales::{self, NewSale};
use super::{api_error, internal_error};

#[derive(Deserialize)]
pub struct ListQ {
    pub user_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct SummaryQ {
    pub user_id: i64,
}

#[derive(Serialize)]
pub struct SalesSummary {
    pub user_id: i64,
    pub net_today: f64,
    pub net_month: f64,
}

/// POST /api/v1/sales
pub async fn create_sale(
    State(state): State<AppState>,
    Json(b): Json<NewSale>,
) -> Result<Json<Sale>, (axum::http::StatusCode, String)> {
    let sale = sales::record_sale(state.store.as_ref(), b).await.map_err(api_error)?;
    Ok(Json(sale))
}

/// GET /api/v1/sales
pub async fn list_sales(
    State(state): State<AppState>,
    Query(q): Query<ListQ>,
) -> Result<Json<Vec<Sale>>, (axum::http::StatusCode, String)> {
    let rows = match q.user_id {
        Some(user_id) => sales::sales_for_user(state.store.as_ref(), user_id)
            .await
            .map_err(api_error)?,
        None => db::fetch_all(state.store.as_ref()).await.map_err(internal_error)?,
    };
    Ok(Json(rows))
}

/// GET /api/v1/sales/summary
pub async fn summary(
    State(state): State<AppState>,
    Query(q): Query<SummaryQ>,
) -> Result<Json<SalesSummary>, (axum::http::StatusCode, String)> {
    let rows = sales::sales_for_user(state.store.as_ref(), q.user_id)
        .await
        .map_err(api_error)?;
    let today = Utc::now().format("%Y-%m-%d").to_string();
    Ok(Json(SalesSummary {
        user_id: q.user_id,
        net_today: sales::net_amount(&rows, q.user_id, &today),
        net_month: sales::net_amount(&rows, q.user_id, &today[..7]),
    }))
}
