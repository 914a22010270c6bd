//! CreateUser: identity, then `users` row, then (optionally) the employee link.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::warn;

use hrdesk_auth::RoleScheme;
use hrdesk_core::{EmployeeId, EmployeeRecord, IdentityId, Role, UserRecord, UserStatus, collections, fields};
use hrdesk_saga::SagaStep;

use super::{Backends, ProvisioningError, ProvisioningSaga, field_patch, require_email, require_non_blank};
use crate::identity::{Credentials, IdentityError, IdentityService};
use crate::record_store::{Filter, RecordStore, RecordStoreExt};

/// Minimum password length accepted before the identity service is called.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub credentials: Credentials,
    pub role: Role,
    pub status: UserStatus,
    pub employee_id: Option<EmployeeId>,
    /// Administrator performing the operation.
    pub created_by: Option<IdentityId>,
}

#[derive(Debug, Clone)]
pub struct CreateUserContext {
    pub request: CreateUserRequest,
    pub identity_id: Option<IdentityId>,
    pub user: Option<UserRecord>,
    pub employee: Option<EmployeeRecord>,
}

impl CreateUserContext {
    pub fn new(request: CreateUserRequest) -> Self {
        Self {
            request,
            identity_id: None,
            user: None,
            employee: None,
        }
    }

    fn identity(&self) -> Result<IdentityId, ProvisioningError> {
        self.identity_id
            .ok_or_else(|| ProvisioningError::invariant("identity not created yet"))
    }
}

pub fn create_user_saga(backends: &Backends, scheme: RoleScheme) -> ProvisioningSaga<CreateUserContext> {
    ProvisioningSaga::new("create_user")
        .step(ValidateUser {
            scheme,
            records: Arc::clone(&backends.records),
        })
        .step(CreateIdentity {
            identity: Arc::clone(&backends.identity),
        })
        .step(InsertUserRecord {
            records: Arc::clone(&backends.records),
        })
        .step(LinkEmployee {
            records: Arc::clone(&backends.records),
        })
}

fn employee_filter(employee_id: &EmployeeId) -> Filter {
    Filter::eq(fields::EMPLOYEE_ID, employee_id.as_str())
}

struct ValidateUser {
    scheme: RoleScheme,
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<CreateUserContext, ProvisioningError> for ValidateUser {
    type Output = ();

    fn name(&self) -> &'static str {
        "validate_request"
    }

    async fn forward(&self, ctx: &mut CreateUserContext) -> Result<(), ProvisioningError> {
        let request = &ctx.request;
        require_non_blank("username", &request.username)?;
        require_email(&request.credentials.email)?;
        if request.credentials.password().chars().count() < MIN_PASSWORD_LEN {
            return Err(ProvisioningError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if !self.scheme.contains(&request.role) {
            return Err(ProvisioningError::validation(format!(
                "role '{}' is not part of the configured role scheme",
                request.role
            )));
        }

        if let Some(employee_id) = &request.employee_id {
            let employee: EmployeeRecord = self
                .records
                .select_one(collections::EMPLOYEES, &employee_filter(employee_id))
                .await?
                .ok_or_else(|| ProvisioningError::validation(format!("unknown employee '{employee_id}'")))?;
            if let Some(linked) = employee.identity_id {
                return Err(ProvisioningError::validation(format!(
                    "employee '{employee_id}' is already linked to identity {linked}"
                )));
            }
        }
        Ok(())
    }
}

struct CreateIdentity {
    identity: Arc<dyn IdentityService>,
}

#[async_trait]
impl SagaStep<CreateUserContext, ProvisioningError> for CreateIdentity {
    type Output = IdentityId;

    fn name(&self) -> &'static str {
        "create_identity"
    }

    async fn forward(&self, ctx: &mut CreateUserContext) -> Result<IdentityId, ProvisioningError> {
        let id = self.identity.create_identity(&ctx.request.credentials).await?;
        ctx.identity_id = Some(id);
        Ok(id)
    }

    async fn compensate(&self, _ctx: &CreateUserContext, id: &IdentityId) -> Result<(), ProvisioningError> {
        match self.identity.delete_identity(*id).await {
            Ok(()) => Ok(()),
            Err(IdentityError::NotFound(_)) => {
                warn!(identity_id = %id, "identity already gone during compensation");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn residue(&self, id: &IdentityId) -> String {
        format!("identity {id}")
    }
}

struct InsertUserRecord {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<CreateUserContext, ProvisioningError> for InsertUserRecord {
    type Output = IdentityId;

    fn name(&self) -> &'static str {
        "insert_user_record"
    }

    async fn forward(&self, ctx: &mut CreateUserContext) -> Result<IdentityId, ProvisioningError> {
        let identity_id = ctx.identity()?;
        let request = &ctx.request;
        let user = UserRecord {
            identity_id,
            username: request.username.trim().to_string(),
            email: request.credentials.email.trim().to_ascii_lowercase(),
            role: request.role.clone(),
            status: request.status,
            employee_id: request.employee_id.clone(),
            created_by: request.created_by,
            created_at: Utc::now(),
        };
        let stored = self.records.insert_typed(collections::USERS, &user).await?;
        ctx.user = Some(stored);
        Ok(identity_id)
    }

    async fn compensate(&self, _ctx: &CreateUserContext, id: &IdentityId) -> Result<(), ProvisioningError> {
        self.records
            .delete(collections::USERS, &Filter::eq(fields::IDENTITY_ID, id.to_string()))
            .await?;
        Ok(())
    }

    fn residue(&self, id: &IdentityId) -> String {
        format!("{} row for identity {id}", collections::USERS)
    }
}

struct LinkEmployee {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<CreateUserContext, ProvisioningError> for LinkEmployee {
    /// The employee that was linked, if one was requested.
    type Output = Option<(EmployeeId, IdentityId)>;

    fn name(&self) -> &'static str {
        "link_employee"
    }

    async fn forward(
        &self,
        ctx: &mut CreateUserContext,
    ) -> Result<Option<(EmployeeId, IdentityId)>, ProvisioningError> {
        let Some(employee_id) = ctx.request.employee_id.clone() else {
            return Ok(None);
        };
        let identity_id = ctx.identity()?;

        // Only an unlinked employee may be claimed; the null clause makes the
        // check and the write a single operation.
        let updated = self
            .records
            .update(
                collections::EMPLOYEES,
                &employee_filter(&employee_id).and(fields::IDENTITY_ID, JsonValue::Null),
                field_patch(fields::IDENTITY_ID, identity_id.to_string()),
            )
            .await?;

        let Some(row) = updated.into_iter().next() else {
            return Err(ProvisioningError::validation(format!(
                "employee '{employee_id}' is missing or already linked"
            )));
        };
        // The claim has landed; a row this crate cannot fully read must not fail the step.
        ctx.employee = match serde_json::from_value::<EmployeeRecord>(row) {
            Ok(employee) => Some(employee),
            Err(err) => {
                warn!(employee_id = %employee_id, error = %err, "linked employee row is not a full employee record");
                None
            }
        };
        Ok(Some((employee_id, identity_id)))
    }

    async fn compensate(
        &self,
        _ctx: &CreateUserContext,
        link: &Option<(EmployeeId, IdentityId)>,
    ) -> Result<(), ProvisioningError> {
        let Some((employee_id, identity_id)) = link else {
            return Ok(());
        };
        self.records
            .update(
                collections::EMPLOYEES,
                &employee_filter(employee_id).and(fields::IDENTITY_ID, identity_id.to_string()),
                field_patch(fields::IDENTITY_ID, JsonValue::Null),
            )
            .await?;
        Ok(())
    }

    fn residue(&self, link: &Option<(EmployeeId, IdentityId)>) -> String {
        match link {
            Some((employee_id, identity_id)) => {
                format!("employee '{employee_id}' still linked to identity {identity_id}")
            }
            None => self.name().to_string(),
        }
    }
}
