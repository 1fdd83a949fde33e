// src/services/session.rs

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::audit::AuditSink;
use super::users::{find_by_email, verify_password};
use crate::db::{self, DocumentStore, Snapshot};
use crate::error::{CrmError, CrmResult};
use crate::models::{NewAuditLog, User};

fn session_event(user: &User, action: &str) -> NewAuditLog {
    NewAuditLog {
        user_id: user.id,
        action_type: action.into(),
        entity_type: "user".into(),
        entity_id: Some(user.id),
        old_value: None,
        new_value: None,
    }
}

/// The logged-in identity, passed explicitly to whoever needs it.
#[derive(Debug, Default, Clone)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub async fn login(
        &mut self,
        store: &dyn DocumentStore,
        email: &str,
        password: &str,
        audit: &AuditSink,
    ) -> CrmResult<User> {
        let user = find_by_email(store, email)
            .await?
            .filter(|u| u.is_active && verify_password(password, &u.password_hash))
            .ok_or_else(|| CrmError::AuthenticationFailed("invalid email or password".into()))?;

        audit.record(session_event(&user, "USER_LOGIN"));
        info!(user_id = user.id, "user logged in");
        self.user = Some(user.clone());
        Ok(user)
    }

    pub fn logout(&mut self, audit: &AuditSink) {
        if let Some(user) = self.user.take() {
            audit.record(session_event(&user, "USER_LOGOUT"));
            info!(user_id = user.id, "user logged out");
        }
    }

    /// Refresh the identity from a `users` snapshot. A deactivated account
    /// ends the session; a missing one leaves it untouched.
    pub fn apply_users_snapshot(&mut self, users: &[User]) {
        let Some(current) = &self.user else { return };
        match users.iter().find(|u| u.id == current.id) {
            Some(found) if found.is_active => self.user = Some(found.clone()),
            Some(found) => {
                info!(user_id = found.id, "account deactivated, session cleared");
                self.user = None;
            }
            None => {}
        }
    }

    /// Keep `session` in sync with a `users` change feed until it closes.
    pub fn watch(
        session: Arc<RwLock<Session>>,
        mut feed: broadcast::Receiver<Snapshot>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(snapshot) => match db::decode_all::<User>(snapshot.as_ref().clone()) {
                        Ok(users) => session.write().await.apply_users_snapshot(&users),
                        Err(e) => warn!(error = %e, "undecodable users snapshot"),
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // the next snapshot is complete, nothing to replay
                        warn!(missed, "users feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Collection, MemoryStore};
    use crate::models::{AuditLog, ExperienceLevel, UserRole};
    use crate::services::users::{create_user, update_user, NewUser, UserPatch};

    async fn setup() -> (Arc<MemoryStore>, AuditSink, JoinHandle<()>, User) {
        let store = Arc::new(MemoryStore::new());
        let user = create_user(
            store.as_ref(),
            NewUser {
                name: "Kiran".into(),
                email: "kiran@leaddesk.test".into(),
                password: "pass-1234".into(),
                mobile: String::new(),
                role: UserRole::Employee,
                is_active: true,
                daily_lead_target: 5,
                experience_level: ExperienceLevel::Senior,
                skills: vec![],
            },
        )
        .await
        .unwrap();
        let (audit, writer) = AuditSink::spawn(store.clone());
        (store, audit, writer, user)
    }

    #[tokio::test]
    async fn login_and_logout_are_audited() {
        let (store, audit, writer, user) = setup().await;
        let mut session = Session::new();

        let logged = session
            .login(store.as_ref(), " KIRAN@leaddesk.test", "pass-1234", &audit)
            .await
            .unwrap();
        assert_eq!(logged.id, user.id);
        assert_eq!(session.current().map(|u| u.id), Some(user.id));

        session.logout(&audit);
        assert!(session.current().is_none());

        drop(audit);
        writer.await.unwrap();
        let logs: Vec<AuditLog> = db::fetch_all(store.as_ref()).await.unwrap();
        let actions: Vec<&str> = logs.iter().map(|l| l.action_type.as_str()).collect();
        assert_eq!(actions, vec!["USER_LOGIN", "USER_LOGOUT"]);
    }

    #[tokio::test]
    async fn bad_password_and_inactive_account_fail() {
        let (store, audit, _writer, user) = setup().await;
        let mut session = Session::new();

        assert!(matches!(
            session.login(store.as_ref(), &user.email, "nope", &audit).await,
            Err(CrmError::AuthenticationFailed(_))
        ));

        update_user(store.as_ref(), user.id, UserPatch { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(session.login(store.as_ref(), &user.email, "pass-1234", &audit).await.is_err());
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn snapshot_refreshes_or_clears_identity() {
        let (store, audit, _writer, user) = setup().await;
        let mut session = Session::new();
        session.login(store.as_ref(), &user.email, "pass-1234", &audit).await.unwrap();

        let mut renamed = user.clone();
        renamed.name = "Kiran R".into();
        session.apply_users_snapshot(&[renamed.clone()]);
        assert_eq!(session.current().unwrap().name, "Kiran R");

        session.apply_users_snapshot(&[]);
        assert!(session.current().is_some());

        renamed.is_active = false;
        session.apply_users_snapshot(&[renamed]);
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn watcher_ends_session_on_deactivation() {
        let (store, audit, _writer, user) = setup().await;
        let mut session = Session::new();
        session.login(store.as_ref(), &user.email, "pass-1234", &audit).await.unwrap();
        let session = Arc::new(RwLock::new(session));

        let feed = store.subscribe(Collection::Users);
        let watcher = Session::watch(session.clone(), feed);

        update_user(store.as_ref(), user.id, UserPatch { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        // the feed closes once the audit writer and this test release the store
        drop(audit);
        drop(store);
        watcher.await.unwrap();

        assert!(session.read().await.current().is_none());
    }
}
