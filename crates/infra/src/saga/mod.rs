//! Concrete provisioning sagas.
//!
//! Each saga is an ordered list of steps over the three backends. The first
//! step of every saga is a read-only validation/lookup step, so a rejected
//! request surfaces the same way as any other clean rollback.

pub mod create_employee;
pub mod create_user;
pub mod delete_user;
pub mod upload_document;

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use hrdesk_core::DomainError;
use hrdesk_saga::{Saga, SagaError};

use crate::identity::{IdentityError, IdentityService};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::record_store::{RecordStore, StoreError};

pub use create_employee::{CreateEmployeeContext, CreateEmployeeRequest, StoragePolicy, create_employee_saga};
pub use create_user::{CreateUserContext, CreateUserRequest, create_user_saga};
pub use delete_user::{DeleteUserContext, DeleteUserRequest, delete_user_saga};
pub use upload_document::{UploadDocumentContext, UploadDocumentRequest, upload_document_saga};

/// Step error of every provisioning saga.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ProvisioningError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}

impl From<DomainError> for ProvisioningError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}

pub type ProvisioningSaga<C> = Saga<C, ProvisioningError>;

/// Result of running a provisioning saga.
pub type SagaResult<C> = Result<C, SagaError<ProvisioningError>>;

/// The three backends a saga talks to.
#[derive(Clone)]
pub struct Backends {
    pub identity: Arc<dyn IdentityService>,
    pub records: Arc<dyn RecordStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl core::fmt::Debug for Backends {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Single-field patch object.
pub(crate) fn field_patch(field: &str, value: impl Into<JsonValue>) -> JsonValue {
    let mut patch = Map::new();
    patch.insert(field.to_string(), value.into());
    JsonValue::Object(patch)
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), ProvisioningError> {
    if value.trim().is_empty() {
        return Err(ProvisioningError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Cheap plausibility check; the identity service has the final word.
pub(crate) fn require_email(value: &str) -> Result<(), ProvisioningError> {
    let plausible = match value.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !plausible {
        return Err(ProvisioningError::validation(format!("'{value}' is not a valid email address")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert!(require_email("ana@example.com").is_ok());
        assert!(require_email("ana@localhost").is_err());
        assert!(require_email("@example.com").is_err());
        assert!(require_email("ana.example.com").is_err());
    }

    #[test]
    fn domain_errors_become_validation_failures() {
        let err: ProvisioningError = DomainError::validation("bad id").into();
        assert!(matches!(err, ProvisioningError::Validation(_)));
    }
}
