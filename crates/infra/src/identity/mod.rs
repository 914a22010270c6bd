//! Identity service boundary.
//!
//! The identity service owns accounts, credentials and sessions; the core
//! only creates/deletes accounts during provisioning and listens to the
//! session notifications it pushes.

pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use hrdesk_core::IdentityId;

pub use in_memory::{IdentityOp, InMemoryIdentityService};

/// Sign-up / sign-in credentials. The password never appears in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated session as pushed by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity_id: IdentityId,
    pub email: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// State at subscription time.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session-change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    pub fn initial(session: Option<Session>) -> Self {
        Self {
            kind: SessionEventKind::InitialSession,
            session,
        }
    }
}

/// Receiving end of the session notifications.
///
/// The first [`next`](Self::next) yields the state current at subscription
/// time; later calls wait for changes. Only the latest session is retained,
/// intermediate ones may be skipped.
#[derive(Debug)]
pub struct SessionSubscription {
    receiver: watch::Receiver<SessionEvent>,
    primed: bool,
}

impl SessionSubscription {
    pub fn new(receiver: watch::Receiver<SessionEvent>) -> Self {
        Self {
            receiver,
            primed: false,
        }
    }

    /// Next notification, or `None` once the identity service is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if !self.primed {
            self.primed = true;
            return Some(self.receiver.borrow_and_update().clone());
        }
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity not found: {0}")]
    NotFound(IdentityId),

    #[error("an identity is already registered for '{0}'")]
    AlreadyRegistered(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Identity service capability.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_identity(&self, credentials: &Credentials) -> Result<IdentityId, IdentityError>;

    async fn delete_identity(&self, id: IdentityId) -> Result<(), IdentityError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Subscribe to session changes (the current state is delivered first).
    fn subscribe(&self) -> SessionSubscription;
}

#[async_trait]
impl<S> IdentityService for Arc<S>
where
    S: IdentityService + ?Sized,
{
    async fn create_identity(&self, credentials: &Credentials) -> Result<IdentityId, IdentityError> {
        (**self).create_identity(credentials).await
    }

    async fn delete_identity(&self, id: IdentityId) -> Result<(), IdentityError> {
        (**self).delete_identity(id).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, IdentityError> {
        (**self).sign_in(credentials).await
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        (**self).sign_out().await
    }

    fn subscribe(&self) -> SessionSubscription {
        (**self).subscribe()
    }
}
