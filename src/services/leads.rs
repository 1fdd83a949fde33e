// src/services/leads.rs

use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map};

use super::audit::AuditSink;
use super::distribution::DistributionEngine;
use super::ledger::AssignmentLedger;
use super::parser::parse_leads_from_text;
use crate::db::{self, Collection, DocumentStore};
use crate::error::{CrmError, CrmResult, StoreError};
use crate::models::{
    Assignment, DistributionOutcome, DistributionStrategy, Lead, LeadStatus, NewAuditLog, User,
};

pub const SMART_DUMP_SOURCE: &str = "Smart Dump";
pub const MANUAL_SOURCE: &str = "Manual Entry";
pub const SELF_ASSIGNED: &str = "Self-Assigned";

#[derive(Debug, Clone, Deserialize)]
pub struct NewLead {
    pub customer_name: String,
    pub customer_mobile: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub process_type: String,
    #[serde(default)]
    pub status: Option<LeadStatus>,
}

pub async fn create_lead(store: &dyn DocumentStore, input: NewLead) -> CrmResult<Lead> {
    if input.customer_name.trim().is_empty() || input.customer_mobile.trim().is_empty() {
        return Err(CrmError::Validation("customer name and mobile are required".into()));
    }
    let now = Utc::now();
    let lead = Lead {
        id: db::next_id(store, Collection::Leads).await?,
        customer_name: input.customer_name.trim().to_string(),
        customer_mobile: input.customer_mobile.trim().to_string(),
        customer_email: input.customer_email,
        location: input.location,
        source: input.source.unwrap_or_else(|| MANUAL_SOURCE.to_string()),
        process_type: input.process_type,
        status: input.status.unwrap_or(LeadStatus::New),
        created_at: now,
        updated_at: now,
    };
    db::insert(store, &lead).await?;
    Ok(lead)
}

/// Newest first.
pub async fn list_leads(store: &dyn DocumentStore) -> CrmResult<Vec<Lead>> {
    let mut leads: Vec<Lead> = db::fetch_all(store).await?;
    leads.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(leads)
}

/// Set `status`, returning the previous one.
pub async fn update_status(
    store: &dyn DocumentStore,
    audit: &AuditSink,
    lead_id: i64,
    status: LeadStatus,
    actor_id: i64,
) -> CrmResult<LeadStatus> {
    let lead: Lead = db::fetch(store, lead_id)
        .await?
        .ok_or(CrmError::NotFound { entity: "lead", id: lead_id })?;

    let mut patch = Map::new();
    patch.insert("status".into(), serde_json::to_value(status).map_err(StoreError::from)?);
    patch.insert("updated_at".into(), json!(Utc::now()));
    if !store.update_fields(Collection::Leads, lead_id, patch).await? {
        return Err(CrmError::NotFound { entity: "lead", id: lead_id });
    }

    audit.record(NewAuditLog {
        user_id: actor_id,
        action_type: "LEAD_STATUS_CHANGE".into(),
        entity_type: "lead".into(),
        entity_id: Some(lead_id),
        old_value: Some(json!({ "status": lead.status })),
        new_value: Some(json!({ "status": status })),
    });
    Ok(lead.status)
}

/// Leads whose active assignment belongs to `employee_id`, newest first.
pub async fn leads_for_employee(
    store: &dyn DocumentStore,
    ledger: &AssignmentLedger,
    employee_id: i64,
) -> CrmResult<Vec<Lead>> {
    let held: HashSet<i64> = ledger
        .active_for_employee(employee_id)
        .await?
        .iter()
        .map(|a| a.lead_id)
        .collect();
    let mut leads = list_leads(store).await?;
    leads.retain(|l| held.contains(&l.id));
    Ok(leads)
}

/// Parse pasted rows, persist the valid ones and distribute them.
pub async fn ingest_pasted_leads(
    store: &dyn DocumentStore,
    engine: &DistributionEngine,
    text: &str,
    strategy: DistributionStrategy,
    requested_by: i64,
) -> CrmResult<DistributionOutcome> {
    let drafts: Vec<_> = parse_leads_from_text(text).into_iter().filter(|d| d.valid).collect();
    if drafts.is_empty() {
        return Err(CrmError::Validation(
            "no valid leads to distribute; check the phone numbers".into(),
        ));
    }

    let mut created = Vec::with_capacity(drafts.len());
    for d in drafts {
        created.push(
            create_lead(
                store,
                NewLead {
                    customer_name: d.customer_name,
                    customer_mobile: d.customer_mobile,
                    customer_email: None,
                    location: Some(d.location),
                    source: Some(SMART_DUMP_SOURCE.to_string()),
                    process_type: d.process_type,
                    status: Some(LeadStatus::New),
                },
            )
            .await?,
        );
    }
    tracing::info!(count = created.len(), "pasted leads created");

    engine.distribute(&created, strategy, requested_by).await
}

/// An employee adds a lead by hand and takes it.
///
/// The employee must exist before anything is written. A lead that lands
/// while the employee is at their daily target is kept, unassigned.
pub async fn add_manual_lead(
    store: &dyn DocumentStore,
    ledger: &AssignmentLedger,
    input: NewLead,
    employee_id: i64,
) -> CrmResult<(Lead, Option<Assignment>)> {
    if db::fetch::<User>(store, employee_id).await?.is_none() {
        return Err(CrmError::NotFound { entity: "employee", id: employee_id });
    }
    let lead = create_lead(
        store,
        NewLead {
            source: Some(MANUAL_SOURCE.to_string()),
            ..input
        },
    )
    .await?;
    let assignment = match ledger.assign(lead.id, employee_id, SELF_ASSIGNED).await {
        Ok(a) => Some(a),
        Err(CrmError::CapacityExceeded { target, .. }) => {
            tracing::info!(
                lead_id = lead.id,
                employee_id,
                target,
                "daily target reached, lead left unassigned"
            );
            None
        }
        Err(e) => return Err(e),
    };
    Ok((lead, assignment))
}
