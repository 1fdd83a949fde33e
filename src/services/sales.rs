// src/services/sales.rs

use chrono::Utc;
use serde::Deserialize;

use crate::db::{self, Collection, DocumentStore};
use crate::error::{CrmError, CrmResult};
use crate::models::{Sale, SaleType};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSale {
    pub user_id: i64,
    pub user_name: String,
    #[serde(default)]
    pub lead_id: Option<i64>,
    #[serde(default)]
    pub lead_name: Option<String>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub sale_type: SaleType,
    pub payment_mode: String,
    #[serde(default)]
    pub comments: Option<String>,
}

pub async fn record_sale(store: &dyn DocumentStore, input: NewSale) -> CrmResult<Sale> {
    if !input.amount.is_finite() || input.amount < 0.0 {
        return Err(CrmError::Validation(format!("invalid sale amount {}", input.amount)));
    }
    let now = Utc::now();
    let sale = Sale {
        id: db::next_id(store, Collection::Sales).await?,
        user_id: input.user_id,
        user_name: input.user_name,
        lead_id: input.lead_id,
        lead_name: input.lead_name,
        amount: input.amount,
        sale_type: input.sale_type,
        payment_mode: input.payment_mode,
        sale_date: now.format("%Y-%m-%d").to_string(),
        sale_time: now.format("%H:%M").to_string(),
        timestamp: now,
        comments: input.comments,
        created_at: now,
    };
    db::insert(store, &sale).await?;
    tracing::info!(sale_id = sale.id, user_id = sale.user_id, amount = sale.amount, "sale recorded");
    Ok(sale)
}

/// Sales for one user, newest first.
pub async fn sales_for_user(store: &dyn DocumentStore, user_id: i64) -> CrmResult<Vec<Sale>> {
    let filter = db::Filter::new().eq("user_id", user_id);
    let mut sales: Vec<Sale> = db::query_as(store, &filter).await?;
    sales.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(sales)
}

/// Adds minus subtracts for `user_id` on dates starting with `date_prefix`
/// (`YYYY-MM-DD` for a day, `YYYY-MM` for a month).
pub fn net_amount(sales: &[Sale], user_id: i64, date_prefix: &str) -> f64 {
    sales
        .iter()
        .filter(|s| s.user_id == user_id && s.sale_date.starts_with(date_prefix))
        .map(|s| match s.sale_type {
            SaleType::Add => s.amount,
            SaleType::Subtract => -s.amount,
        })
        .sum()
}
