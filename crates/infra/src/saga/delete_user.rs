//! DeleteUser: release the employee link, drop the `users` row, then delete
//! the identity. The identity goes last because it cannot be restored.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::warn;

use hrdesk_core::{EmployeeId, Entity, IdentityId, UserRecord, collections, fields};
use hrdesk_saga::SagaStep;

use super::{Backends, ProvisioningError, ProvisioningSaga, field_patch};
use crate::identity::{IdentityError, IdentityService};
use crate::record_store::{Filter, RecordStore, RecordStoreExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteUserRequest {
    pub identity_id: IdentityId,
}

#[derive(Debug, Clone)]
pub struct DeleteUserContext {
    pub request: DeleteUserRequest,
    /// The row as it was before deletion.
    pub user: Option<UserRecord>,
    pub unlinked_employees: Vec<EmployeeId>,
}

impl DeleteUserContext {
    pub fn new(request: DeleteUserRequest) -> Self {
        Self {
            request,
            user: None,
            unlinked_employees: Vec::new(),
        }
    }
}

pub fn delete_user_saga(backends: &Backends) -> ProvisioningSaga<DeleteUserContext> {
    ProvisioningSaga::new("delete_user")
        .step(LoadUser {
            records: Arc::clone(&backends.records),
        })
        .step(UnlinkEmployee {
            records: Arc::clone(&backends.records),
        })
        .step(DeleteUserRecord {
            records: Arc::clone(&backends.records),
        })
        .step(DeleteIdentity {
            identity: Arc::clone(&backends.identity),
        })
}

fn identity_filter(id: IdentityId) -> Filter {
    Filter::eq(fields::IDENTITY_ID, id.to_string())
}

fn employee_id_of(row: &JsonValue) -> Result<EmployeeId, ProvisioningError> {
    let raw = row
        .get(fields::EMPLOYEE_ID)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProvisioningError::invariant("linked employee row has no employee_id"))?;
    Ok(EmployeeId::parse(raw)?)
}

struct LoadUser {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<DeleteUserContext, ProvisioningError> for LoadUser {
    type Output = ();

    fn name(&self) -> &'static str {
        "load_user_record"
    }

    async fn forward(&self, ctx: &mut DeleteUserContext) -> Result<(), ProvisioningError> {
        let id = ctx.request.identity_id;
        let user: UserRecord = self
            .records
            .select_one(collections::USERS, &identity_filter(id))
            .await?
            .ok_or_else(|| ProvisioningError::validation(format!("no user record for identity {id}")))?;
        ctx.user = Some(user);
        Ok(())
    }
}

struct UnlinkEmployee {
    records: Arc<dyn RecordStore>,
}

impl UnlinkEmployee {
    async fn relink(&self, employee_id: &str, identity_id: IdentityId) -> Result<(), ProvisioningError> {
        self.records
            .update(
                collections::EMPLOYEES,
                &Filter::eq(fields::EMPLOYEE_ID, employee_id).and(fields::IDENTITY_ID, JsonValue::Null),
                field_patch(fields::IDENTITY_ID, identity_id.to_string()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SagaStep<DeleteUserContext, ProvisioningError> for UnlinkEmployee {
    type Output = Vec<EmployeeId>;

    fn name(&self) -> &'static str {
        "unlink_employee"
    }

    async fn forward(&self, ctx: &mut DeleteUserContext) -> Result<Vec<EmployeeId>, ProvisioningError> {
        // Every linked row must be addressable by employee id, or the link
        // could not be restored; check before writing.
        let linked = self
            .records
            .select(collections::EMPLOYEES, &identity_filter(ctx.request.identity_id))
            .await?;
        let expected = linked.iter().map(employee_id_of).collect::<Result<Vec<_>, _>>()?;

        let updated = self
            .records
            .update(
                collections::EMPLOYEES,
                &identity_filter(ctx.request.identity_id),
                field_patch(fields::IDENTITY_ID, JsonValue::Null),
            )
            .await?;

        let parsed = updated.iter().map(employee_id_of).collect::<Result<Vec<_>, _>>();

        match parsed {
            Ok(unlinked) => {
                ctx.unlinked_employees = unlinked.clone();
                Ok(unlinked)
            }
            Err(err) => {
                // The update already landed; put the links back before failing.
                let id = ctx.request.identity_id;
                for employee_id in &expected {
                    self.relink(employee_id.as_str(), id).await?;
                }
                Err(err)
            }
        }
    }

    async fn compensate(&self, ctx: &DeleteUserContext, unlinked: &Vec<EmployeeId>) -> Result<(), ProvisioningError> {
        let id = ctx.request.identity_id;
        for employee_id in unlinked {
            self.relink(employee_id.as_str(), id).await?;
        }
        Ok(())
    }

    fn residue(&self, unlinked: &Vec<EmployeeId>) -> String {
        let ids: Vec<&str> = unlinked.iter().map(EmployeeId::as_str).collect();
        format!("employees unlinked from their identity: {}", ids.join(", "))
    }
}

struct DeleteUserRecord {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<DeleteUserContext, ProvisioningError> for DeleteUserRecord {
    type Output = UserRecord;

    fn name(&self) -> &'static str {
        "delete_user_record"
    }

    async fn forward(&self, ctx: &mut DeleteUserContext) -> Result<UserRecord, ProvisioningError> {
        let user = ctx
            .user
            .clone()
            .ok_or_else(|| ProvisioningError::invariant("user record not loaded"))?;
        self.records
            .delete(collections::USERS, &identity_filter(*user.id()))
            .await?;
        Ok(user)
    }

    async fn compensate(&self, _ctx: &DeleteUserContext, user: &UserRecord) -> Result<(), ProvisioningError> {
        self.records.insert_typed(collections::USERS, user).await?;
        Ok(())
    }

    fn residue(&self, user: &UserRecord) -> String {
        format!("{} row for identity {} deleted", collections::USERS, user.identity_id)
    }
}

struct DeleteIdentity {
    identity: Arc<dyn IdentityService>,
}

#[async_trait]
impl SagaStep<DeleteUserContext, ProvisioningError> for DeleteIdentity {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete_identity"
    }

    async fn forward(&self, ctx: &mut DeleteUserContext) -> Result<(), ProvisioningError> {
        let id = ctx.request.identity_id;
        match self.identity.delete_identity(id).await {
            Ok(()) => Ok(()),
            Err(IdentityError::NotFound(_)) => {
                warn!(identity_id = %id, "identity already gone; user record removed anyway");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
