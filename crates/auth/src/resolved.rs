use hrdesk_core::{EmployeeRecord, IdentityId, Role, UserStatus};

/// Lifecycle phase of a session resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionPhase {
    /// No session notification seen yet.
    Unresolved,
    /// A notification arrived; role/employee lookup is in flight.
    Resolving,
    /// Lookup settled (signed in or signed out).
    Resolved,
}

/// Authorization state derived from the current session.
///
/// Rebuilt as a whole on every session notification; consumers only ever see
/// complete snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolvedIdentity {
    #[default]
    Unresolved,
    Resolving,
    /// Resolved: there is explicitly no session.
    SignedOut,
    /// Resolved: a session exists (possibly without a usable role).
    Authenticated(Box<AuthenticatedIdentity>),
}

impl ResolvedIdentity {
    pub fn authenticated(identity: AuthenticatedIdentity) -> Self {
        Self::Authenticated(Box::new(identity))
    }

    pub fn phase(&self) -> ResolutionPhase {
        match self {
            ResolvedIdentity::Unresolved => ResolutionPhase::Unresolved,
            ResolvedIdentity::Resolving => ResolutionPhase::Resolving,
            ResolvedIdentity::SignedOut | ResolvedIdentity::Authenticated(_) => {
                ResolutionPhase::Resolved
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.phase() == ResolutionPhase::Resolved
    }

    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        match self {
            ResolvedIdentity::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// A signed-in identity joined with its user and employee rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub identity_id: IdentityId,
    pub email: String,
    /// `None` when the user row is missing, unreadable, or holds a role the
    /// active scheme does not know. Such an identity is authenticated but
    /// authorized for nothing.
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub employee: Option<EmployeeRecord>,
    /// Why the role/employee lookup failed, if it did.
    pub lookup_error: Option<String>,
}

impl AuthenticatedIdentity {
    /// Authenticated, but the lookup that would grant a role failed.
    pub fn roleless(identity_id: IdentityId, email: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            identity_id,
            email: email.into(),
            role: None,
            status: None,
            employee: None,
            lookup_error: Some(reason.into()),
        }
    }

    pub fn has_role(&self) -> bool {
        self.role.is_some()
    }
}
