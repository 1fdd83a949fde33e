// src/models/mod.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ───────────────────────────────────────
// Users (admin / employee)
// ───────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Employee,
}

impl UserRole {
    /// Only employees are bound by their daily lead target.
    pub fn enforces_capacity(self) -> bool {
        matches!(self, UserRole::Employee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Senior,
    New,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub mobile: String,
    pub role: UserRole,
    pub is_active: bool,
    pub daily_lead_target: i64,
    pub experience_level: ExperienceLevel,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_distributable(&self) -> bool {
        self.role == UserRole::Employee && self.is_active
    }
}

/// `User` as returned over HTTP, without the password digest.
#[derive(Debug, Clone, Serialize)]
pub struct UserResp {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub role: UserRole,
    pub is_active: bool,
    pub daily_lead_target: i64,
    pub experience_level: ExperienceLevel,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResp {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            mobile: u.mobile,
            role: u.role,
            is_active: u.is_active,
            daily_lead_target: u.daily_lead_target,
            experience_level: u.experience_level,
            skills: u.skills,
            created_at: u.created_at,
        }
    }
}

// ───────────────────────────────────────
// Leads
// ───────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    New,
    Calling,
    #[serde(rename = "Follow-up")]
    FollowUp,
    #[serde(rename = "Not Interested")]
    NotInterested,
    Converted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub customer_name: String,
    pub customer_mobile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub source: String,
    pub process_type: String,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output row of the pasted-table parser. `index` only correlates the row
/// with its input line and is never persisted as a lead id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLead {
    pub index: usize,
    pub customer_name: String,
    pub customer_mobile: String,
    pub location: String,
    pub process_type: String,
    pub valid: bool,
}

// ───────────────────────────────────────
// Assignment ledger
// ───────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub lead_id: i64,
    pub assigned_to: i64,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub active: bool,
}

// ───────────────────────────────────────
// Sales
// ───────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleType {
    Add,
    Subtract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_name: Option<String>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub sale_type: SaleType,
    pub payment_mode: String,
    pub sale_date: String,        // YYYY-MM-DD
    pub sale_time: String,        // HH:MM
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ───────────────────────────────────────
// Audit
// ───────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: i64,
    pub action_type: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit event before the writer gives it an id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditLog {
    pub user_id: i64,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}

// ───────────────────────────────────────
// Distribution
// ───────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionStrategy {
    Equal,
    TargetBased,
    SkillBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionOutcome {
    pub batch_id: uuid::Uuid,
    pub assigned: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
