//! CreateEmployee: `employees` row, then its storage area, then (optionally)
//! an access-policy row for that area.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hrdesk_core::{
    EmployeeId, EmployeeRecord, EmployeeStorage, EmployeeStorageLayout, Entity, NewEmployee, collections, fields,
};
use hrdesk_saga::SagaStep;

use super::{Backends, ProvisioningError, ProvisioningSaga, require_email, require_non_blank};
use crate::object_store::{AreaOptions, Blob, ObjectStore};
use crate::record_store::{Filter, RecordStore, RecordStoreExt};

#[derive(Debug, Clone)]
pub struct CreateEmployeeRequest {
    pub employee: NewEmployee,
    /// Write a `storage_policies` row for the new area.
    pub register_policy: bool,
}

impl CreateEmployeeRequest {
    pub fn new(employee: NewEmployee) -> Self {
        Self {
            employee,
            register_policy: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateEmployeeContext {
    pub request: CreateEmployeeRequest,
    pub record: Option<EmployeeRecord>,
    pub policy: Option<StoragePolicy>,
}

impl CreateEmployeeContext {
    pub fn new(request: CreateEmployeeRequest) -> Self {
        Self {
            request,
            record: None,
            policy: None,
        }
    }
}

/// Row in the `storage_policies` collection: who may read an employee's area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePolicy {
    pub employee_id: EmployeeId,
    pub area: String,
    /// Object prefix the policy covers (empty for a whole dedicated area).
    pub prefix: String,
    pub public: bool,
    pub created_at: DateTime<Utc>,
}

pub fn create_employee_saga(
    backends: &Backends,
    layout: EmployeeStorageLayout,
) -> ProvisioningSaga<CreateEmployeeContext> {
    ProvisioningSaga::new("create_employee")
        .step(ValidateEmployee {
            records: Arc::clone(&backends.records),
        })
        .step(InsertEmployeeRecord {
            records: Arc::clone(&backends.records),
            layout,
        })
        .step(ProvisionStorageArea {
            objects: Arc::clone(&backends.objects),
        })
        .step(RegisterAccessPolicy {
            records: Arc::clone(&backends.records),
        })
}

fn employee_filter(employee_id: &EmployeeId) -> Filter {
    Filter::eq(fields::EMPLOYEE_ID, employee_id.as_str())
}

struct ValidateEmployee {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<CreateEmployeeContext, ProvisioningError> for ValidateEmployee {
    type Output = ();

    fn name(&self) -> &'static str {
        "validate_request"
    }

    async fn forward(&self, ctx: &mut CreateEmployeeContext) -> Result<(), ProvisioningError> {
        let employee = &ctx.request.employee;
        require_non_blank("full name", &employee.full_name)?;
        require_email(&employee.email)?;

        let existing = self
            .records
            .select(collections::EMPLOYEES, &employee_filter(&employee.employee_id))
            .await?;
        if !existing.is_empty() {
            return Err(ProvisioningError::validation(format!(
                "employee '{}' already exists",
                employee.employee_id
            )));
        }
        Ok(())
    }
}

struct InsertEmployeeRecord {
    records: Arc<dyn RecordStore>,
    layout: EmployeeStorageLayout,
}

#[async_trait]
impl SagaStep<CreateEmployeeContext, ProvisioningError> for InsertEmployeeRecord {
    type Output = EmployeeId;

    fn name(&self) -> &'static str {
        "insert_employee_record"
    }

    async fn forward(&self, ctx: &mut CreateEmployeeContext) -> Result<EmployeeId, ProvisioningError> {
        let new = ctx.request.employee.clone();
        let storage = self.layout.storage_for(&new.employee_id);
        let record = EmployeeRecord::from_new(new, storage, Utc::now());

        let stored = self.records.insert_typed(collections::EMPLOYEES, &record).await?;
        let id = stored.id().clone();
        ctx.record = Some(stored);
        Ok(id)
    }

    async fn compensate(&self, _ctx: &CreateEmployeeContext, id: &EmployeeId) -> Result<(), ProvisioningError> {
        self.records.delete(collections::EMPLOYEES, &employee_filter(id)).await?;
        Ok(())
    }

    fn residue(&self, id: &EmployeeId) -> String {
        format!("{} row '{id}'", collections::EMPLOYEES)
    }
}

struct ProvisionStorageArea {
    objects: Arc<dyn ObjectStore>,
}

#[async_trait]
impl SagaStep<CreateEmployeeContext, ProvisioningError> for ProvisionStorageArea {
    type Output = EmployeeStorage;

    fn name(&self) -> &'static str {
        "provision_storage_area"
    }

    async fn forward(&self, ctx: &mut CreateEmployeeContext) -> Result<EmployeeStorage, ProvisioningError> {
        let storage = ctx
            .record
            .as_ref()
            .map(|r| r.storage.clone())
            .ok_or_else(|| ProvisioningError::invariant("employee record not inserted yet"))?;

        match &storage {
            EmployeeStorage::Dedicated { area } => {
                self.objects.create_area(area, AreaOptions::private()).await?;
            }
            EmployeeStorage::Shared { marker } => {
                self.objects.upload(&marker.area, &marker.path, Blob::empty()).await?;
            }
        }
        Ok(storage)
    }

    async fn compensate(
        &self,
        _ctx: &CreateEmployeeContext,
        storage: &EmployeeStorage,
    ) -> Result<(), ProvisioningError> {
        match storage {
            EmployeeStorage::Dedicated { area } => self.objects.remove_area(area).await?,
            EmployeeStorage::Shared { marker } => {
                self.objects
                    .remove(&marker.area, std::slice::from_ref(&marker.path))
                    .await?
            }
        }
        Ok(())
    }

    fn residue(&self, storage: &EmployeeStorage) -> String {
        storage.to_string()
    }
}

/// Last step; nothing after it can fail, and removing the area already
/// revokes access, so it has no compensation.
struct RegisterAccessPolicy {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<CreateEmployeeContext, ProvisioningError> for RegisterAccessPolicy {
    type Output = ();

    fn name(&self) -> &'static str {
        "register_access_policy"
    }

    async fn forward(&self, ctx: &mut CreateEmployeeContext) -> Result<(), ProvisioningError> {
        if !ctx.request.register_policy {
            return Ok(());
        }
        let record = ctx
            .record
            .as_ref()
            .ok_or_else(|| ProvisioningError::invariant("employee record not inserted yet"))?;

        let policy = StoragePolicy {
            employee_id: record.employee_id.clone(),
            area: record.storage.area().to_string(),
            prefix: record.storage.prefix(),
            public: false,
            created_at: Utc::now(),
        };
        let stored = self.records.insert_typed(collections::STORAGE_POLICIES, &policy).await?;
        ctx.policy = Some(stored);
        Ok(())
    }
}
