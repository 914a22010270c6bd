//! Session resolution: turns pushed session notifications into
//! [`ResolvedIdentity`] snapshots.
//!
//! Only the latest notification matters. Each one bumps a generation counter
//! and aborts the lookup that was in flight; a lookup commits its result only
//! if its generation is still current, checked under the same lock that
//! `notify` holds while bumping, so a stale result can never overwrite a newer
//! state whatever order the lookups finish in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hrdesk_auth::{AuthenticatedIdentity, ResolvedIdentity, RoleScheme};
use hrdesk_core::{EmployeeRecord, UserRecord, collections, fields};

use crate::identity::{Session, SessionEvent, SessionSubscription};
use crate::record_store::{Filter, RecordStore, RecordStoreExt, StoreError};

pub struct SessionResolver {
    records: Arc<dyn RecordStore>,
    scheme: RoleScheme,
    state: watch::Sender<ResolvedIdentity>,
    generation: AtomicU64,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl core::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("state", &*self.state.borrow())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SessionResolver {
    pub fn new(records: Arc<dyn RecordStore>, scheme: RoleScheme) -> Arc<Self> {
        let (state, _) = watch::channel(ResolvedIdentity::Unresolved);
        Arc::new(Self {
            records,
            scheme,
            state,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        })
    }

    /// Receiver of resolved-identity snapshots (starts at the current one).
    pub fn watch(&self) -> watch::Receiver<ResolvedIdentity> {
        self.state.subscribe()
    }

    pub fn current(&self) -> ResolvedIdentity {
        self.state.borrow().clone()
    }

    pub fn scheme(&self) -> &RoleScheme {
        &self.scheme
    }

    /// Feed every notification from `subscription` into the resolver.
    ///
    /// Must be called from within a tokio runtime. The task ends when the
    /// identity service drops its side of the subscription.
    pub fn listen(self: &Arc<Self>, mut subscription: SessionSubscription) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                resolver.notify(event);
            }
            debug!("session subscription closed");
        })
    }

    /// Handle one session notification, superseding any in-flight lookup.
    ///
    /// A signed-out notification resolves to `SignedOut` synchronously, so
    /// observers never see a `Resolving` phase for it. Only sessions with an
    /// identity go through `Resolving` while the lookup runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify(self: &Arc<Self>, event: SessionEvent) {
        let mut in_flight = self.lock_in_flight();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(stale) = in_flight.take() {
            stale.abort();
        }
        debug!(kind = ?event.kind, generation, "session notification");

        let Some(session) = event.session else {
            self.state.send_replace(ResolvedIdentity::SignedOut);
            info!(generation, "session resolved: signed out");
            return;
        };

        self.state.send_replace(ResolvedIdentity::Resolving);
        let resolver = Arc::clone(self);
        *in_flight = Some(tokio::spawn(async move {
            let resolved = resolver.resolve(&session).await;
            resolver.commit(generation, resolved);
        }));
    }

    fn commit(&self, generation: u64, resolved: ResolvedIdentity) {
        let _guard = self.lock_in_flight();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding superseded session resolution");
            return;
        }
        if let Some(identity) = resolved.identity() {
            info!(
                generation,
                identity_id = %identity.identity_id,
                role = identity.role.as_ref().map(|r| r.as_str()).unwrap_or("<none>"),
                "session resolved"
            );
        }
        self.state.send_replace(resolved);
    }

    /// Join the session with its user and employee rows.
    ///
    /// Never fails: any lookup problem yields an authenticated identity
    /// without a role.
    pub async fn resolve(&self, session: &Session) -> ResolvedIdentity {
        match self.lookup(session).await {
            Ok(identity) => ResolvedIdentity::authenticated(identity),
            Err(err) => {
                warn!(identity_id = %session.identity_id, error = %err, "role lookup failed; identity has no role");
                ResolvedIdentity::authenticated(AuthenticatedIdentity::roleless(
                    session.identity_id,
                    session.email.clone(),
                    err.to_string(),
                ))
            }
        }
    }

    async fn lookup(&self, session: &Session) -> Result<AuthenticatedIdentity, StoreError> {
        let by_identity = Filter::eq(fields::IDENTITY_ID, session.identity_id.to_string());

        let Some(user) = self
            .records
            .select_one::<UserRecord>(collections::USERS, &by_identity)
            .await?
        else {
            return Ok(AuthenticatedIdentity::roleless(
                session.identity_id,
                session.email.clone(),
                "no user record for this identity",
            ));
        };

        let employee: Option<EmployeeRecord> = match &user.employee_id {
            Some(employee_id) => {
                self.records
                    .select_one(collections::EMPLOYEES, &Filter::eq(fields::EMPLOYEE_ID, employee_id.as_str()))
                    .await?
            }
            None => self.records.select_one(collections::EMPLOYEES, &by_identity).await?,
        };

        let role = self.scheme.recognize(user.role.as_str());
        let lookup_error = match role {
            Some(_) => None,
            None => {
                warn!(
                    identity_id = %session.identity_id,
                    role = %user.role,
                    "stored role is not part of the configured scheme; treating as no role"
                );
                Some(format!("unknown role '{}'", user.role))
            }
        };

        Ok(AuthenticatedIdentity {
            identity_id: session.identity_id,
            email: session.email.clone(),
            role,
            status: Some(user.status),
            employee,
            lookup_error,
        })
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value as JsonValue;
    use tokio::sync::Semaphore;

    use hrdesk_auth::{RouteDecision, decide, well_known};
    use hrdesk_core::{IdentityId, UserStatus};

    use crate::identity::{Credentials, IdentityService, InMemoryIdentityService, SessionEventKind};
    use crate::record_store::{InMemoryRecordStore, StoreOp};

    /// Record store whose `users` lookups for selected identities block until released.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryRecordStore,
        gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    }

    impl GatedStore {
        fn gate(&self, id: IdentityId) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            self.gates.lock().unwrap().insert(id.to_string(), Arc::clone(&gate));
            gate
        }
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn insert(&self, collection: &str, record: JsonValue) -> Result<JsonValue, StoreError> {
            self.inner.insert(collection, record).await
        }

        async fn update(&self, collection: &str, filter: &Filter, patch: JsonValue) -> Result<Vec<JsonValue>, StoreError> {
            self.inner.update(collection, filter, patch).await
        }

        async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
            self.inner.delete(collection, filter).await
        }

        async fn select(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>, StoreError> {
            let gate = match (collection, filter.value_of(fields::IDENTITY_ID)) {
                (collections::USERS, Some(JsonValue::String(id))) => self.gates.lock().unwrap().get(id).cloned(),
                _ => None,
            };
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.unwrap();
            }
            self.inner.select(collection, filter).await
        }
    }

    fn session(id: IdentityId, email: &str) -> Session {
        Session {
            identity_id: id,
            email: email.to_string(),
            access_token: "t".to_string(),
            expires_at: Utc::now(),
        }
    }

    fn signed_in(session: Session) -> SessionEvent {
        SessionEvent {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    async fn seed_user(store: &dyn RecordStore, id: IdentityId, role: &str) {
        let user = UserRecord {
            identity_id: id,
            username: format!("user-{id}"),
            email: format!("{id}@example.com"),
            role: hrdesk_core::Role::new(role.to_string()),
            status: UserStatus::Active,
            employee_id: None,
            created_by: None,
            created_at: Utc::now(),
        };
        store.insert(collections::USERS, serde_json::to_value(user).unwrap()).await.unwrap();
    }

    async fn settled(resolver: &SessionResolver) -> ResolvedIdentity {
        let mut rx = resolver.watch();
        let resolved = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_resolved()))
            .await
            .expect("resolution did not settle")
            .expect("resolver dropped")
            .clone();
        resolved
    }

    #[tokio::test]
    async fn starts_unresolved_and_initial_empty_session_signs_out() {
        let resolver = SessionResolver::new(Arc::new(InMemoryRecordStore::new()), RoleScheme::four_role());
        assert_eq!(resolver.current(), ResolvedIdentity::Unresolved);
        assert_eq!(decide(&resolver.current(), &[]), RouteDecision::Pending);

        resolver.notify(SessionEvent::initial(None));
        assert_eq!(resolver.current(), ResolvedIdentity::SignedOut);
        assert_eq!(decide(&resolver.current(), &[]), RouteDecision::RedirectLogin);
    }

    #[tokio::test]
    async fn resolving_is_pending_until_lookup_completes() {
        let store = Arc::new(GatedStore::default());
        let id = IdentityId::new();
        seed_user(store.as_ref(), id, "admin").await;
        let gate = store.gate(id);

        let resolver = SessionResolver::new(store.clone(), RoleScheme::four_role());
        resolver.notify(signed_in(session(id, "a@example.com")));
        assert_eq!(resolver.current(), ResolvedIdentity::Resolving);
        assert_eq!(decide(&resolver.current(), &[well_known::ADMIN]), RouteDecision::Pending);

        gate.add_permits(1);
        let resolved = settled(&resolver).await;
        assert_eq!(resolved.identity().unwrap().role, Some(well_known::ADMIN));
        assert_eq!(decide(&resolved, &[well_known::ADMIN]), RouteDecision::Allow);
    }

    #[tokio::test]
    async fn newer_notification_supersedes_in_flight_lookup() {
        let store = Arc::new(GatedStore::default());
        let a = IdentityId::new();
        let b = IdentityId::new();
        seed_user(store.as_ref(), a, "admin").await;
        seed_user(store.as_ref(), b, "employee").await;
        let gate_a = store.gate(a);
        let gate_b = store.gate(b);

        let resolver = SessionResolver::new(store.clone(), RoleScheme::four_role());
        resolver.notify(signed_in(session(a, "a@example.com")));
        resolver.notify(signed_in(session(b, "b@example.com")));

        // B finishes first, then A is released: A must not win.
        gate_b.add_permits(1);
        let resolved = settled(&resolver).await;
        gate_a.add_permits(1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(resolved.identity().unwrap().identity_id, b);
        assert_eq!(resolver.current().identity().unwrap().identity_id, b);
        assert_eq!(resolver.current().identity().unwrap().role, Some(well_known::EMPLOYEE));
    }

    #[tokio::test]
    async fn stale_lookup_finishing_last_is_discarded() {
        let store = Arc::new(GatedStore::default());
        let a = IdentityId::new();
        let b = IdentityId::new();
        seed_user(store.as_ref(), a, "admin").await;
        seed_user(store.as_ref(), b, "hr").await;
        let gate_a = store.gate(a);
        let gate_b = store.gate(b);

        let resolver = SessionResolver::new(store.clone(), RoleScheme::four_role());
        resolver.notify(signed_in(session(a, "a@example.com")));
        resolver.notify(signed_in(session(b, "b@example.com")));

        // A released first this time; it was superseded and must stay invisible.
        gate_a.add_permits(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.current(), ResolvedIdentity::Resolving);

        gate_b.add_permits(1);
        let resolved = settled(&resolver).await;
        assert_eq!(resolved.identity().unwrap().identity_id, b);
    }

    #[tokio::test]
    async fn lookup_failure_resolves_to_roleless_identity() {
        let store = Arc::new(InMemoryRecordStore::new());
        let id = IdentityId::new();
        seed_user(store.as_ref(), id, "admin").await;
        store.fail_next(StoreOp::Select, collections::USERS);

        let resolver = SessionResolver::new(store.clone(), RoleScheme::four_role());
        resolver.notify(signed_in(session(id, "a@example.com")));
        let resolved = settled(&resolver).await;

        let identity = resolved.identity().unwrap();
        assert_eq!(identity.role, None);
        assert!(identity.lookup_error.is_some());
        assert_eq!(decide(&resolved, &[]), RouteDecision::RedirectUnauthorized);
    }

    #[tokio::test]
    async fn role_outside_scheme_is_not_mapped() {
        let store = Arc::new(InMemoryRecordStore::new());
        let id = IdentityId::new();
        seed_user(store.as_ref(), id, "user").await;

        let resolver = SessionResolver::new(store.clone(), RoleScheme::four_role());
        resolver.notify(signed_in(session(id, "a@example.com")));
        let resolved = settled(&resolver).await;

        let identity = resolved.identity().unwrap();
        assert_eq!(identity.role, None);
        assert_eq!(identity.status, Some(UserStatus::Active));
        assert_eq!(decide(&resolved, &[]), RouteDecision::RedirectUnauthorized);
    }

    #[tokio::test]
    async fn follows_identity_service_sign_in_and_out() {
        let identity = Arc::new(InMemoryIdentityService::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let creds = Credentials::new("ana@example.com", "s3cret-pass");
        let id = identity.create_identity(&creds).await.unwrap();
        seed_user(store.as_ref(), id, "hr").await;

        let resolver = SessionResolver::new(store.clone(), RoleScheme::four_role());
        let mut rx = resolver.watch();
        let _listener = resolver.listen(identity.subscribe());

        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == ResolvedIdentity::SignedOut))
            .await
            .unwrap()
            .unwrap();

        identity.sign_in(&creds).await.unwrap();
        let resolved = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.identity().is_some_and(|i| i.identity_id == id)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(resolved.identity().unwrap().role, Some(well_known::HR));

        identity.sign_out().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == ResolvedIdentity::SignedOut))
            .await
            .unwrap()
            .unwrap();
    }
}
