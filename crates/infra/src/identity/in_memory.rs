use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use hrdesk_core::IdentityId;

use super::{
    Credentials, IdentityError, IdentityService, Session, SessionEvent, SessionEventKind,
    SessionSubscription,
};
use crate::faults::FaultPlan;

/// Operations that can be made to fail via [`InMemoryIdentityService::fail_next`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IdentityOp {
    Create,
    Delete,
    SignIn,
}

#[derive(Debug, Clone)]
struct Account {
    email: String,
    password: String,
}

/// In-memory identity service.
///
/// Intended for tests/dev. One process-wide "current session", like a
/// browser client.
#[derive(Debug)]
pub struct InMemoryIdentityService {
    accounts: RwLock<HashMap<IdentityId, Account>>,
    sessions: watch::Sender<SessionEvent>,
    faults: FaultPlan<IdentityOp>,
    session_ttl: Duration,
}

impl Default for InMemoryIdentityService {
    fn default() -> Self {
        let (sessions, _) = watch::channel(SessionEvent::initial(None));
        Self {
            accounts: RwLock::new(HashMap::new()),
            sessions,
            faults: FaultPlan::new(),
            session_ttl: Duration::hours(1),
        }
    }
}

impl InMemoryIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, op: IdentityOp) {
        self.faults.arm(op, 1);
    }

    pub fn fail_times(&self, op: IdentityOp, times: u32) {
        self.faults.arm(op, times);
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.accounts
            .read()
            .map(|accounts| accounts.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn identity_count(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Current session, if signed in.
    pub fn current_session(&self) -> Option<Session> {
        self.sessions.borrow().session.clone()
    }

    /// Re-issue the current session's token and notify subscribers.
    pub fn refresh_session(&self) -> Option<Session> {
        let mut session = self.current_session()?;
        session.access_token = new_token();
        session.expires_at = Utc::now() + self.session_ttl;
        self.publish(SessionEventKind::TokenRefreshed, Some(session.clone()));
        Some(session)
    }

    /// Push an arbitrary notification (simulates the service's own schedule).
    pub fn publish(&self, kind: SessionEventKind, session: Option<Session>) {
        self.sessions.send_replace(SessionEvent { kind, session });
    }

    fn check_fault(&self, op: IdentityOp) -> Result<(), IdentityError> {
        if self.faults.trip(&op) {
            return Err(IdentityError::Unavailable(format!("injected fault on {op:?}")));
        }
        Ok(())
    }

    fn poisoned() -> IdentityError {
        IdentityError::Unavailable("lock poisoned".to_string())
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn create_identity(&self, credentials: &Credentials) -> Result<IdentityId, IdentityError> {
        self.check_fault(IdentityOp::Create)?;

        let email = credentials.email.trim().to_ascii_lowercase();
        let mut accounts = self.accounts.write().map_err(|_| Self::poisoned())?;
        if accounts.values().any(|a| a.email == email) {
            return Err(IdentityError::AlreadyRegistered(email));
        }

        let id = IdentityId::new();
        accounts.insert(
            id,
            Account {
                email,
                password: credentials.password().to_string(),
            },
        );
        Ok(id)
    }

    async fn delete_identity(&self, id: IdentityId) -> Result<(), IdentityError> {
        self.check_fault(IdentityOp::Delete)?;

        let mut accounts = self.accounts.write().map_err(|_| Self::poisoned())?;
        accounts
            .remove(&id)
            .map(|_| ())
            .ok_or(IdentityError::NotFound(id))
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, IdentityError> {
        self.check_fault(IdentityOp::SignIn)?;

        let email = credentials.email.trim().to_ascii_lowercase();
        let identity_id = {
            let accounts = self.accounts.read().map_err(|_| Self::poisoned())?;
            accounts
                .iter()
                .find(|(_, a)| a.email == email && a.password == credentials.password())
                .map(|(id, _)| *id)
                .ok_or(IdentityError::InvalidCredentials)?
        };

        let session = Session {
            identity_id,
            email,
            access_token: new_token(),
            expires_at: Utc::now() + self.session_ttl,
        };
        self.publish(SessionEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.publish(SessionEventKind::SignedOut, None);
        Ok(())
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.sessions.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(email: &str) -> Credentials {
        Credentials::new(email, "s3cret-pass")
    }

    #[tokio::test]
    async fn create_and_delete_identity() {
        let svc = InMemoryIdentityService::new();
        let id = svc.create_identity(&creds("a@example.com")).await.unwrap();
        assert!(svc.contains(id));

        assert_eq!(
            svc.create_identity(&creds("A@example.com")).await,
            Err(IdentityError::AlreadyRegistered("a@example.com".to_string()))
        );

        svc.delete_identity(id).await.unwrap();
        assert!(!svc.contains(id));
        assert_eq!(svc.delete_identity(id).await, Err(IdentityError::NotFound(id)));
    }

    #[tokio::test]
    async fn injected_fault_fails_once() {
        let svc = InMemoryIdentityService::new();
        svc.fail_next(IdentityOp::Create);
        assert!(matches!(
            svc.create_identity(&creds("b@example.com")).await,
            Err(IdentityError::Unavailable(_))
        ));
        assert!(svc.create_identity(&creds("b@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn subscription_delivers_initial_state_then_changes() {
        let svc = InMemoryIdentityService::new();
        let id = svc.create_identity(&creds("c@example.com")).await.unwrap();
        let mut sub = svc.subscribe();

        let first = sub.next().await.unwrap();
        assert_eq!(first.kind, SessionEventKind::InitialSession);
        assert_eq!(first.session, None);

        let session = svc.sign_in(&creds("c@example.com")).await.unwrap();
        assert_eq!(session.identity_id, id);
        let signed_in = sub.next().await.unwrap();
        assert_eq!(signed_in.kind, SessionEventKind::SignedIn);

        let refreshed = svc.refresh_session().unwrap();
        assert_ne!(refreshed.access_token, session.access_token);
        assert_eq!(sub.next().await.unwrap().kind, SessionEventKind::TokenRefreshed);

        svc.sign_out().await.unwrap();
        let signed_out = sub.next().await.unwrap();
        assert_eq!(signed_out.kind, SessionEventKind::SignedOut);
        assert_eq!(signed_out.session, None);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let svc = InMemoryIdentityService::new();
        svc.create_identity(&creds("d@example.com")).await.unwrap();
        let err = svc
            .sign_in(&Credentials::new("d@example.com", "nope"))
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::InvalidCredentials);
        assert_eq!(svc.current_session(), None);
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let rendered = format!("{:?}", creds("e@example.com"));
        assert!(!rendered.contains("s3cret"));
    }
}
