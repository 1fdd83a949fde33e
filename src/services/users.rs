// src/services/users.rs

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::db::{self, Collection, DocumentStore};
use crate::error::{CrmError, CrmResult, StoreError};
use crate::models::{ExperienceLevel, User, UserRole};

pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    hash_password(password) == password_hash
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub mobile: String,
    pub role: UserRole,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub daily_lead_target: i64,
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub skills: Vec<String>,
}

fn default_active() -> bool {
    true
}

/// Field patch; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub daily_lead_target: Option<i64>,
    pub experience_level: Option<ExperienceLevel>,
    pub skills: Option<Vec<String>>,
}

impl UserPatch {
    fn into_fields(self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut fields = Map::new();
        if let Some(v) = self.name {
            fields.insert("name".into(), Value::String(v));
        }
        if let Some(v) = self.mobile {
            fields.insert("mobile".into(), Value::String(v));
        }
        if let Some(v) = self.password {
            fields.insert("password_hash".into(), Value::String(hash_password(&v)));
        }
        if let Some(v) = self.is_active {
            fields.insert("is_active".into(), Value::Bool(v));
        }
        if let Some(v) = self.daily_lead_target {
            fields.insert("daily_lead_target".into(), v.into());
        }
        if let Some(v) = self.experience_level {
            fields.insert("experience_level".into(), serde_json::to_value(v)?);
        }
        if let Some(v) = self.skills {
            fields.insert("skills".into(), serde_json::to_value(v)?);
        }
        Ok(fields)
    }
}

pub async fn find_by_email(store: &dyn DocumentStore, email: &str) -> CrmResult<Option<User>> {
    let filter = db::Filter::new().eq("email", normalize_email(email));
    let mut users: Vec<User> = db::query_as(store, &filter).await?;
    Ok(users.pop())
}

pub async fn create_user(store: &dyn DocumentStore, input: NewUser) -> CrmResult<User> {
    let email = normalize_email(&input.email);
    if email.is_empty() || input.name.trim().is_empty() {
        return Err(CrmError::Validation("name and email are required".into()));
    }
    if input.daily_lead_target < 0 {
        return Err(CrmError::Validation("daily_lead_target cannot be negative".into()));
    }
    if find_by_email(store, &email).await?.is_some() {
        return Err(CrmError::Validation(format!("email {email} is already registered")));
    }

    let user = User {
        id: db::next_id(store, Collection::Users).await?,
        name: input.name.trim().to_string(),
        email,
        password_hash: hash_password(&input.password),
        mobile: input.mobile,
        role: input.role,
        is_active: input.is_active,
        daily_lead_target: input.daily_lead_target,
        experience_level: input.experience_level,
        skills: input.skills,
        created_at: Utc::now(),
    };
    db::insert(store, &user).await?;
    tracing::info!(user_id = user.id, role = ?user.role, "user created");
    Ok(user)
}

/// Last write wins per field. Lowering a target never revokes leads that
/// are already assigned.
pub async fn update_user(store: &dyn DocumentStore, id: i64, patch: UserPatch) -> CrmResult<User> {
    if patch.daily_lead_target.is_some_and(|t| t < 0) {
        return Err(CrmError::Validation("daily_lead_target cannot be negative".into()));
    }
    let fields = patch.into_fields().map_err(StoreError::from)?;
    if !store.update_fields(Collection::Users, id, fields).await? {
        return Err(CrmError::NotFound { entity: "user", id });
    }
    db::fetch(store, id)
        .await?
        .ok_or(CrmError::NotFound { entity: "user", id })
}

pub async fn remove_user(store: &dyn DocumentStore, id: i64) -> CrmResult<bool> {
    Ok(store.delete(Collection::Users, id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    pub(crate) fn new_user(email: &str, role: UserRole) -> NewUser {
        NewUser {
            name: "Priya Nair".into(),
            email: email.into(),
            password: "s3cret".into(),
            mobile: "9000000000".into(),
            role,
            is_active: true,
            daily_lead_target: 10,
            experience_level: ExperienceLevel::New,
            skills: vec!["GST".into()],
        }
    }

    #[tokio::test]
    async fn create_normalizes_email_and_hashes_password() {
        let store = MemoryStore::new();
        let user = create_user(&store, new_user("  Priya@Example.COM ", UserRole::Employee))
            .await
            .unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.email, "priya@example.com");
        assert_ne!(user.password_hash, "s3cret");
        assert!(verify_password("s3cret", &user.password_hash));
        assert!(!verify_password("wrong", &user.password_hash));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        create_user(&store, new_user("a@x.io", UserRole::Admin)).await.unwrap();
        let err = create_user(&store, new_user("A@X.io", UserRole::Employee)).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let store = MemoryStore::new();
        let user = create_user(&store, new_user("a@x.io", UserRole::Employee)).await.unwrap();

        let updated = update_user(
            &store,
            user.id,
            UserPatch {
                daily_lead_target: Some(3),
                experience_level: Some(ExperienceLevel::Senior),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.daily_lead_target, 3);
        assert_eq!(updated.experience_level, ExperienceLevel::Senior);
        assert_eq!(updated.name, "Priya Nair");
        assert_eq!(updated.skills, vec!["GST".to_string()]);
    }

    #[tokio::test]
    async fn patch_and_remove_unknown_user() {
        let store = MemoryStore::new();
        assert!(matches!(
            update_user(&store, 5, UserPatch::default()).await,
            Err(CrmError::NotFound { entity: "user", id: 5 })
        ));
        assert!(!remove_user(&store, 5).await.unwrap());
    }
}
