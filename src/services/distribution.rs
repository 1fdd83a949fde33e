// src/services/distribution.rs

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::audit::AuditSink;
use super::ledger::AssignmentLedger;
use crate::db::{self, DocumentStore};
use crate::error::{CrmError, CrmResult};
use crate::models::{
    DistributionOutcome, DistributionStrategy, ExperienceLevel, Lead, NewAuditLog, User,
};

pub const ASSIGNMENT_REASON: &str = "seniority-balanced round robin";
pub const NO_CAPACITY_MESSAGE: &str = "No active employees with remaining capacity found.";

/// Batch-local view of an employee. Built once per batch from a roster
/// snapshot and mutated as leads are handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionCandidate {
    pub employee_id: i64,
    pub experience_level: ExperienceLevel,
    pub skills: Vec<String>,
    pub daily_lead_target: i64,
    pub assigned_count: i64,
    pub remaining_capacity: i64,
}

impl DistributionCandidate {
    pub fn from_employee(user: &User, assigned_count: i64) -> Self {
        Self {
            employee_id: user.id,
            experience_level: user.experience_level,
            skills: user.skills.clone(),
            daily_lead_target: user.daily_lead_target,
            assigned_count,
            remaining_capacity: user.daily_lead_target - assigned_count,
        }
    }

    fn tier(&self) -> u8 {
        match self.experience_level {
            ExperienceLevel::Senior => 0,
            ExperienceLevel::New => 1,
        }
    }

    /// Seniors first, then fewest assigned today, then most headroom.
    pub fn priority(a: &Self, b: &Self) -> Ordering {
        a.tier()
            .cmp(&b.tier())
            .then(a.assigned_count.cmp(&b.assigned_count))
            .then(b.remaining_capacity.cmp(&a.remaining_capacity))
    }

    pub fn has_skill(&self, process_type: &str) -> bool {
        self.skills.iter().any(|s| s == process_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub lead_id: i64,
    pub employee_id: i64,
}

/// Decide who gets each lead, in input order. No I/O.
///
/// The roster is re-sorted before every lead because the previous pick
/// changed someone's counts. Candidates at or over capacity never receive a
/// lead. Leads left over once the roster is exhausted get no pairing.
pub fn plan(
    leads: &[Lead],
    mut roster: Vec<DistributionCandidate>,
    strategy: DistributionStrategy,
) -> Vec<Pairing> {
    roster.retain(|c| c.remaining_capacity > 0);
    let mut pairings = Vec::with_capacity(leads.len());

    for lead in leads {
        if roster.is_empty() {
            break;
        }
        roster.sort_by(DistributionCandidate::priority);

        // Skill match is a preference; with no match anyone may take it.
        // Equal and TargetBased share the same ordering.
        let idx = match strategy {
            DistributionStrategy::SkillBased => roster
                .iter()
                .position(|c| c.has_skill(&lead.process_type))
                .unwrap_or(0),
            DistributionStrategy::Equal | DistributionStrategy::TargetBased => 0,
        };

        let chosen = &mut roster[idx];
        pairings.push(Pairing {
            lead_id: lead.id,
            employee_id: chosen.employee_id,
        });
        chosen.assigned_count += 1;
        chosen.remaining_capacity -= 1;
        if chosen.remaining_capacity <= 0 {
            roster.remove(idx);
        }
    }

    pairings
}

pub struct DistributionEngine {
    store: Arc<dyn DocumentStore>,
    ledger: Arc<AssignmentLedger>,
    audit: AuditSink,
}

impl DistributionEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<AssignmentLedger>,
        audit: AuditSink,
    ) -> Self {
        Self { store, ledger, audit }
    }

    /// Active employees with their counts for today, in id order.
    pub async fn roster(&self) -> CrmResult<Vec<DistributionCandidate>> {
        let users: Vec<User> = db::fetch_all(self.store.as_ref()).await?;
        let counts: HashMap<i64, i64> = self.ledger.active_counts_today().await?;
        Ok(users
            .iter()
            .filter(|u| u.is_distributable())
            .map(|u| DistributionCandidate::from_employee(u, counts.get(&u.id).copied().unwrap_or(0)))
            .collect())
    }

    /// Hand `leads` out across the roster and persist through the ledger.
    ///
    /// Per-lead failures (capacity races, missing rows, store errors) are
    /// counted as skipped; already persisted pairings are kept. Only an
    /// empty batch is rejected.
    pub async fn distribute(
        &self,
        leads: &[Lead],
        strategy: DistributionStrategy,
        requested_by: i64,
    ) -> CrmResult<DistributionOutcome> {
        if leads.is_empty() {
            return Err(CrmError::Validation("no leads to distribute".into()));
        }
        let batch_id = Uuid::new_v4();
        let span = info_span!("distribute", %batch_id, leads = leads.len(), ?strategy, requested_by);
        self.run_batch(batch_id, leads, strategy, requested_by)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        batch_id: Uuid,
        leads: &[Lead],
        strategy: DistributionStrategy,
        requested_by: i64,
    ) -> CrmResult<DistributionOutcome> {
        let roster = self.roster().await?;
        if roster.iter().all(|c| c.remaining_capacity <= 0) {
            warn!("no eligible employees, batch skipped");
            return Ok(DistributionOutcome {
                batch_id,
                assigned: 0,
                skipped: leads.len(),
                message: Some(NO_CAPACITY_MESSAGE.to_string()),
            });
        }

        let pairings = plan(leads, roster, strategy);
        let assigned = self.persist(&pairings, requested_by).await;

        let skipped = leads.len() - assigned;
        info!(assigned, skipped, "distribution finished");
        Ok(DistributionOutcome {
            batch_id,
            assigned,
            skipped,
            message: (skipped > 0)
                .then(|| format!("{skipped} leads skipped; raise daily targets to assign more.")),
        })
    }

    /// Write `pairings` through the ledger, returning how many landed.
    /// A rejected pairing is logged and dropped; earlier writes stay.
    pub async fn persist(&self, pairings: &[Pairing], requested_by: i64) -> usize {
        let assigned_by = format!("auto_dist_admin_{requested_by}");

        // Sequential, in planning order: earlier pairings win a capacity race.
        let mut assigned = 0;
        for p in pairings {
            match self.ledger.assign(p.lead_id, p.employee_id, &assigned_by).await {
                Ok(_) => {
                    assigned += 1;
                    self.audit.record(NewAuditLog {
                        user_id: requested_by,
                        action_type: "LEAD_ASSIGNED".into(),
                        entity_type: "lead".into(),
                        entity_id: Some(p.lead_id),
                        old_value: None,
                        new_value: Some(json!({
                            "assigned_to": p.employee_id,
                            "reason": ASSIGNMENT_REASON,
                        })),
                    });
                }
                Err(e) => {
                    warn!(lead_id = p.lead_id, employee_id = p.employee_id, error = %e, "pairing skipped");
                }
            }
        }
        assigned
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::{Collection, MemoryStore};
    use crate::models::{Assignment, AuditLog};
    use crate::services::ledger::tests::{employee, lead};

    fn candidate(id: i64, level: ExperienceLevel, target: i64, count: i64, skills: &[&str]) -> DistributionCandidate {
        DistributionCandidate::from_employee(&employee(id, level, target, skills), count)
    }

    fn leads(n: i64, process: &str) -> Vec<Lead> {
        (1..=n).map(|id| lead(id, process)).collect()
    }

    fn owners(pairings: &[Pairing]) -> Vec<i64> {
        pairings.iter().map(|p| p.employee_id).collect()
    }

    #[test]
    fn senior_beats_new_at_equal_capacity() {
        let roster = vec![
            candidate(1, ExperienceLevel::New, 5, 0, &[]),
            candidate(2, ExperienceLevel::Senior, 5, 0, &[]),
        ];
        let pairings = plan(&leads(1, "GST"), roster, DistributionStrategy::Equal);
        assert_eq!(owners(&pairings), vec![2]);
    }

    #[test]
    fn least_loaded_in_tier_goes_first_and_is_reevaluated() {
        let roster = vec![
            candidate(1, ExperienceLevel::Senior, 10, 2, &[]),
            candidate(2, ExperienceLevel::Senior, 10, 0, &[]),
        ];
        let pairings = plan(&leads(4, "GST"), roster, DistributionStrategy::Equal);
        // employee 2 catches up to 2, the full tie on lead 3 keeps the last order
        assert_eq!(owners(&pairings), vec![2, 2, 2, 1]);
    }

    #[test]
    fn headroom_breaks_count_ties() {
        let roster = vec![
            candidate(1, ExperienceLevel::New, 3, 1, &[]),
            candidate(2, ExperienceLevel::New, 8, 1, &[]),
        ];
        let pairings = plan(&leads(1, "GST"), roster, DistributionStrategy::TargetBased);
        assert_eq!(owners(&pairings), vec![2]);
    }

    #[test]
    fn seniors_are_drained_before_new_hires() {
        let roster = vec![
            candidate(1, ExperienceLevel::Senior, 5, 0, &[]),
            candidate(2, ExperienceLevel::New, 5, 0, &[]),
        ];
        let pairings = plan(&leads(3, "GST"), roster, DistributionStrategy::Equal);
        assert_eq!(pairings.len(), 3);
        assert_eq!(owners(&pairings), vec![1, 1, 1]);

        let roster = vec![
            candidate(1, ExperienceLevel::Senior, 2, 0, &[]),
            candidate(2, ExperienceLevel::New, 5, 0, &[]),
        ];
        let pairings = plan(&leads(3, "GST"), roster, DistributionStrategy::Equal);
        assert_eq!(owners(&pairings), vec![1, 1, 2]);
    }

    #[test]
    fn never_exceeds_remaining_capacity() {
        let roster = vec![
            candidate(1, ExperienceLevel::Senior, 2, 1, &[]),
            candidate(2, ExperienceLevel::New, 1, 0, &[]),
            candidate(3, ExperienceLevel::New, 4, 6, &[]),
        ];
        let pairings = plan(&leads(6, "GST"), roster, DistributionStrategy::Equal);
        assert_eq!(owners(&pairings), vec![1, 2]);
    }

    #[test]
    fn skill_based_prefers_matching_candidates() {
        let roster = vec![
            candidate(1, ExperienceLevel::Senior, 5, 0, &["GST"]),
            candidate(2, ExperienceLevel::New, 5, 0, &["ITR"]),
        ];
        let pairings = plan(&leads(2, "ITR"), roster, DistributionStrategy::SkillBased);
        assert_eq!(owners(&pairings), vec![2, 2]);
    }

    #[test]
    fn skill_based_falls_back_to_full_roster() {
        let roster = vec![
            candidate(1, ExperienceLevel::New, 5, 0, &["GST"]),
            candidate(2, ExperienceLevel::Senior, 5, 0, &["ITR"]),
        ];
        let pairings = plan(&leads(1, "Trademark"), roster, DistributionStrategy::SkillBased);
        assert_eq!(owners(&pairings), vec![2]);
    }

    #[test]
    fn equal_ignores_skills() {
        let roster = vec![
            candidate(1, ExperienceLevel::Senior, 5, 0, &["GST"]),
            candidate(2, ExperienceLevel::New, 5, 0, &["ITR"]),
        ];
        let pairings = plan(&leads(1, "ITR"), roster, DistributionStrategy::Equal);
        assert_eq!(owners(&pairings), vec![1]);
    }

    async fn engine_with(employees: &[User], lead_count: i64) -> (Arc<MemoryStore>, DistributionEngine, Vec<Lead>) {
        let store = Arc::new(MemoryStore::new());
        for e in employees {
            db::insert(store.as_ref(), e).await.unwrap();
        }
        let batch = leads(lead_count, "Legal Service");
        for l in &batch {
            db::insert(store.as_ref(), l).await.unwrap();
        }
        let ledger = Arc::new(AssignmentLedger::new(store.clone()));
        let (audit, _writer) = AuditSink::spawn(store.clone());
        let engine = DistributionEngine::new(store.clone(), ledger, audit);
        (store, engine, batch)
    }

    #[tokio::test]
    async fn full_batch_with_sufficient_capacity() {
        let (_store, engine, batch) = engine_with(
            &[
                employee(1, ExperienceLevel::Senior, 5, &[]),
                employee(2, ExperienceLevel::New, 5, &[]),
            ],
            3,
        )
        .await;

        let outcome = engine.distribute(&batch, DistributionStrategy::Equal, 100).await.unwrap();
        assert_eq!((outcome.assigned, outcome.skipped), (3, 0));
        assert!(outcome.message.is_none());

        let active = engine.ledger.active_for_employee(1).await.unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|a| a.assigned_by == "auto_dist_admin_100"));
    }

    #[tokio::test]
    async fn exhausted_roster_skips_whole_batch() {
        let (store, engine, batch) =
            engine_with(&[employee(1, ExperienceLevel::Senior, 1, &[])], 2).await;
        engine.ledger.assign(1, 1, "manual").await.unwrap();
        let before = store.max_id(Collection::Assignments).await.unwrap();

        let outcome = engine.distribute(&batch, DistributionStrategy::Equal, 100).await.unwrap();
        assert_eq!((outcome.assigned, outcome.skipped), (0, 2));
        assert_eq!(outcome.message.as_deref(), Some(NO_CAPACITY_MESSAGE));
        assert_eq!(store.max_id(Collection::Assignments).await.unwrap(), before);
    }

    #[tokio::test]
    async fn partial_capacity_reports_skips() {
        let (_store, engine, batch) = engine_with(
            &[
                employee(1, ExperienceLevel::Senior, 2, &[]),
                employee(2, ExperienceLevel::New, 1, &[]),
            ],
            5,
        )
        .await;

        let outcome = engine.distribute(&batch, DistributionStrategy::Equal, 7).await.unwrap();
        assert_eq!((outcome.assigned, outcome.skipped), (3, 2));
        assert!(outcome.message.is_some());
        assert_eq!(engine.ledger.active_assignments_today(1).await.unwrap(), 2);
        assert_eq!(engine.ledger.active_assignments_today(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn inactive_employees_and_admins_are_left_out() {
        let mut inactive = employee(1, ExperienceLevel::Senior, 5, &[]);
        inactive.is_active = false;
        let mut admin = employee(2, ExperienceLevel::Senior, 5, &[]);
        admin.role = crate::models::UserRole::Admin;
        let (_store, engine, batch) =
            engine_with(&[inactive, admin, employee(3, ExperienceLevel::New, 5, &[])], 2).await;

        let outcome = engine.distribute(&batch, DistributionStrategy::Equal, 2).await.unwrap();
        assert_eq!(outcome.assigned, 2);
        assert_eq!(engine.ledger.active_for_employee(3).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pre_existing_overload_is_not_increased() {
        let (store, engine, batch) = engine_with(
            &[
                employee(1, ExperienceLevel::Senior, 1, &[]),
                employee(2, ExperienceLevel::New, 3, &[]),
            ],
            2,
        )
        .await;
        // three manual rows for a target of one
        for (id, lead_id) in [(1, 10), (2, 11), (3, 12)] {
            let row = Assignment {
                id,
                lead_id,
                assigned_to: 1,
                assigned_by: "override".into(),
                assigned_at: Utc::now(),
                active: true,
            };
            db::insert(store.as_ref(), &row).await.unwrap();
        }

        let outcome = engine.distribute(&batch, DistributionStrategy::Equal, 1).await.unwrap();
        assert_eq!(outcome.assigned, 2);
        assert_eq!(engine.ledger.active_assignments_today(1).await.unwrap(), 3);
        assert_eq!(engine.ledger.active_assignments_today(2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_lead_is_skipped_not_fatal() {
        let (_store, engine, mut batch) =
            engine_with(&[employee(1, ExperienceLevel::Senior, 5, &[])], 2).await;
        batch.push(lead(40, "GST")); // never persisted

        let outcome = engine.distribute(&batch, DistributionStrategy::Equal, 1).await.unwrap();
        assert_eq!((outcome.assigned, outcome.skipped), (2, 1));
    }

    #[tokio::test]
    async fn target_lowered_after_planning_skips_the_overflow() {
        let (store, engine, batch) =
            engine_with(&[employee(1, ExperienceLevel::Senior, 3, &[])], 3).await;
        let pairings = plan(&batch, engine.roster().await.unwrap(), DistributionStrategy::Equal);
        assert_eq!(owners(&pairings), vec![1, 1, 1]);

        // an admin cuts the target while the batch is in flight
        let mut patch = serde_json::Map::new();
        patch.insert("daily_lead_target".into(), json!(1));
        assert!(store.update_fields(Collection::Users, 1, patch).await.unwrap());

        assert_eq!(engine.persist(&pairings, 4).await, 1);
        let held = engine.ledger.active_for_employee(1).await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].lead_id, 1);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let (_store, engine, _batch) =
            engine_with(&[employee(1, ExperienceLevel::Senior, 5, &[])], 0).await;
        assert!(matches!(
            engine.distribute(&[], DistributionStrategy::Equal, 1).await,
            Err(CrmError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn each_assignment_is_audited() {
        let store = Arc::new(MemoryStore::new());
        db::insert(store.as_ref(), &employee(1, ExperienceLevel::Senior, 5, &[])).await.unwrap();
        let batch = leads(2, "GST");
        for l in &batch {
            db::insert(store.as_ref(), l).await.unwrap();
        }
        let ledger = Arc::new(AssignmentLedger::new(store.clone()));
        let (audit, writer) = AuditSink::spawn(store.clone());
        let engine = DistributionEngine::new(store.clone(), ledger, audit);

        engine.distribute(&batch, DistributionStrategy::Equal, 9).await.unwrap();
        drop(engine);
        writer.await.unwrap();

        let logs: Vec<AuditLog> = db::fetch_all(store.as_ref()).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.action_type == "LEAD_ASSIGNED" && l.user_id == 9));
        assert_eq!(logs[0].new_value.as_ref().unwrap()["reason"], ASSIGNMENT_REASON);
    }
}
