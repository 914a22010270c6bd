use thiserror::Error;

use hrdesk_core::Role;

use crate::{AuthenticatedIdentity, ResolvedIdentity, RoleScheme};

/// Outcome of gating a route on the resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDecision {
    Allow,
    RedirectLogin,
    RedirectUnauthorized,
    /// Resolution not settled: render neither the protected view nor a redirect.
    Pending,
}

impl RouteDecision {
    pub const LOGIN_PATH: &'static str = "/";
    pub const UNAUTHORIZED_PATH: &'static str = "/unauthorized";

    pub fn is_pending(self) -> bool {
        self == RouteDecision::Pending
    }

    /// Where the presentation layer should navigate, if anywhere.
    pub fn redirect_target(self) -> Option<&'static str> {
        match self {
            RouteDecision::RedirectLogin => Some(Self::LOGIN_PATH),
            RouteDecision::RedirectUnauthorized => Some(Self::UNAUTHORIZED_PATH),
            RouteDecision::Allow | RouteDecision::Pending => None,
        }
    }
}

/// Decide whether a route may render.
///
/// `required` empty means "any authenticated identity with a role".
///
/// - No IO
/// - No panics
/// - Deterministic; safe to call on every render
pub fn decide(resolved: &ResolvedIdentity, required: &[Role]) -> RouteDecision {
    match resolved {
        ResolvedIdentity::Unresolved | ResolvedIdentity::Resolving => RouteDecision::Pending,
        ResolvedIdentity::SignedOut => RouteDecision::RedirectLogin,
        ResolvedIdentity::Authenticated(identity) => match &identity.role {
            None => RouteDecision::RedirectUnauthorized,
            Some(role) if required.is_empty() || required.contains(role) => RouteDecision::Allow,
            Some(_) => RouteDecision::RedirectUnauthorized,
        },
    }
}

/// A redirect decision, as an error value. Expected, not a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationDenied {
    #[error("sign-in required")]
    NotSignedIn,

    #[error("identity has no usable role")]
    NoRole,

    #[error("role '{role}' is not permitted here")]
    RoleNotPermitted { role: Role },
}

impl AuthorizationDenied {
    pub fn decision(&self) -> RouteDecision {
        match self {
            AuthorizationDenied::NotSignedIn => RouteDecision::RedirectLogin,
            AuthorizationDenied::NoRole | AuthorizationDenied::RoleNotPermitted { .. } => {
                RouteDecision::RedirectUnauthorized
            }
        }
    }
}

/// [`decide`] for callers that want the identity on success.
///
/// `Ok(None)` while pending, `Ok(Some(identity))` when allowed.
pub fn authorize_route<'a>(
    resolved: &'a ResolvedIdentity,
    required: &[Role],
) -> Result<Option<&'a AuthenticatedIdentity>, AuthorizationDenied> {
    match decide(resolved, required) {
        RouteDecision::Pending => Ok(None),
        RouteDecision::Allow => Ok(resolved.identity()),
        RouteDecision::RedirectLogin => Err(AuthorizationDenied::NotSignedIn),
        RouteDecision::RedirectUnauthorized => match resolved.identity().and_then(|i| i.role.clone()) {
            Some(role) => Err(AuthorizationDenied::RoleNotPermitted { role }),
            None => Err(AuthorizationDenied::NoRole),
        },
    }
}

/// Where to send someone arriving at the application root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landing {
    Pending,
    Login,
    Unauthorized,
    AdminDashboard,
    UserDashboard,
}

impl Landing {
    pub fn path(self) -> Option<&'static str> {
        match self {
            Landing::Pending => None,
            Landing::Login => Some(RouteDecision::LOGIN_PATH),
            Landing::Unauthorized => Some(RouteDecision::UNAUTHORIZED_PATH),
            Landing::AdminDashboard => Some("/admin-dashboard"),
            Landing::UserDashboard => Some("/user-dashboard"),
        }
    }
}

/// Admin-equivalent roles land on the admin dashboard, every other role on
/// the user dashboard.
pub fn landing(resolved: &ResolvedIdentity, scheme: &RoleScheme) -> Landing {
    match resolved {
        ResolvedIdentity::Unresolved | ResolvedIdentity::Resolving => Landing::Pending,
        ResolvedIdentity::SignedOut => Landing::Login,
        ResolvedIdentity::Authenticated(identity) => match &identity.role {
            Some(role) if scheme.is_admin_equivalent(role) => Landing::AdminDashboard,
            Some(_) => Landing::UserDashboard,
            None => Landing::Unauthorized,
        },
    }
}
