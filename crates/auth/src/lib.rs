//! `hrdesk-auth` — pure authorization boundary for role-gated pages.
//!
//! This crate is intentionally decoupled from the identity service and the
//! record store: it only interprets an already-resolved identity.

pub mod authorize;
pub mod resolved;
pub mod scheme;

pub use authorize::{AuthorizationDenied, Landing, RouteDecision, authorize_route, decide, landing};
pub use hrdesk_core::Role;
pub use resolved::{AuthenticatedIdentity, ResolutionPhase, ResolvedIdentity};
pub use scheme::{RoleScheme, RoleSchemeError, well_known};
