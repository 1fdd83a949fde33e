// src/services/ledger.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde_json::{json, Map};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::{self, Collection, DocumentStore, Filter, WriteBatch};
use crate::error::{CrmError, CrmResult};
use crate::models::{Assignment, Lead, User};

/// Half-open ISO bounds `[day 00:00, next day 00:00)` for a UTC date.
pub fn day_bounds(day: NaiveDate) -> (String, String) {
    let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
    (format!("{day}T00:00:00"), format!("{next}T00:00:00"))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Owns every write to the `assignments` collection.
///
/// A lead has at most one active assignment. `assign` deactivates the old
/// rows and inserts the new one in a single batch while holding
/// `write_lock`, so two concurrent calls cannot both leave an active row.
pub struct AssignmentLedger {
    store: Arc<dyn DocumentStore>,
    write_lock: Mutex<()>,
}

impl AssignmentLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn today_filter() -> Filter {
        let (start, end) = day_bounds(today());
        Filter::new().eq("active", true).range("assigned_at", start, end)
    }

    pub async fn active_assignments_today(&self, employee_id: i64) -> CrmResult<usize> {
        let filter = Self::today_filter().eq("assigned_to", employee_id);
        Ok(self.store.query(Collection::Assignments, &filter).await?.len())
    }

    /// Active assignments made today, counted per employee.
    pub async fn active_counts_today(&self) -> CrmResult<HashMap<i64, i64>> {
        let rows: Vec<Assignment> = db::query_as(self.store.as_ref(), &Self::today_filter()).await?;
        let mut counts = HashMap::new();
        for row in rows {
            *counts.entry(row.assigned_to).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn history(&self, lead_id: i64) -> CrmResult<Vec<Assignment>> {
        let filter = Filter::new().eq("lead_id", lead_id);
        Ok(db::query_as(self.store.as_ref(), &filter).await?)
    }

    pub async fn active_assignment(&self, lead_id: i64) -> CrmResult<Option<Assignment>> {
        let filter = Filter::new().eq("lead_id", lead_id).eq("active", true);
        let rows: Vec<Assignment> = db::query_as(self.store.as_ref(), &filter).await?;
        Ok(rows.into_iter().next_back())
    }

    pub async fn active_for_employee(&self, employee_id: i64) -> CrmResult<Vec<Assignment>> {
        let filter = Filter::new().eq("assigned_to", employee_id).eq("active", true);
        Ok(db::query_as(self.store.as_ref(), &filter).await?)
    }

    pub async fn assign(
        &self,
        lead_id: i64,
        employee_id: i64,
        assigned_by: &str,
    ) -> CrmResult<Assignment> {
        let _guard = self.write_lock.lock().await;
        let store = self.store.as_ref();

        let employee: User = db::fetch(store, employee_id)
            .await?
            .ok_or(CrmError::NotFound { entity: "employee", id: employee_id })?;
        if db::fetch::<Lead>(store, lead_id).await?.is_none() {
            return Err(CrmError::NotFound { entity: "lead", id: lead_id });
        }

        if employee.role.enforces_capacity() {
            let held = self.active_assignments_today(employee_id).await? as i64;
            if held >= employee.daily_lead_target {
                debug!(employee_id, held, target = employee.daily_lead_target, "capacity reached");
                return Err(CrmError::CapacityExceeded {
                    employee_id,
                    target: employee.daily_lead_target,
                });
            }
        }

        let mut batch = WriteBatch::new();
        for prior in self.history(lead_id).await? {
            if prior.active {
                let mut patch = Map::new();
                patch.insert("active".into(), json!(false));
                batch.update(Collection::Assignments, prior.id, patch);
            }
        }

        let assignment = Assignment {
            id: db::next_id(store, Collection::Assignments).await?,
            lead_id,
            assigned_to: employee_id,
            assigned_by: assigned_by.to_string(),
            assigned_at: Utc::now(),
            active: true,
        };
        batch.put(
            Collection::Assignments,
            assignment.id,
            serde_json::to_value(&assignment).map_err(crate::error::StoreError::from)?,
        );
        store.commit(batch).await?;

        info!(lead_id, employee_id, assignment_id = assignment.id, assigned_by, "lead assigned");
        Ok(assignment)
    }
}
