//! UploadDocument: blob first, then the `documents` row pointing at it.
//!
//! A row must never reference a path that was not written, so the blob goes
//! first; if the row insert fails the blob is removed again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use hrdesk_core::storage::{document_location, new_disambiguator};
use hrdesk_core::{
    DocumentId, DocumentRecord, DocumentType, EmployeeId, EmployeeRecord, Entity, IdentityId, StorageLocation, UserRecord,
    collections, fields,
};
use hrdesk_saga::SagaStep;

use super::{Backends, ProvisioningError, ProvisioningSaga, require_non_blank};
use crate::object_store::{Blob, ObjectStore};
use crate::record_store::{Filter, RecordStore, RecordStoreExt};

#[derive(Debug, Clone)]
pub struct UploadDocumentRequest {
    /// Identity the document belongs to.
    pub owner: IdentityId,
    pub uploaded_by: IdentityId,
    pub document_type: DocumentType,
    pub file_name: String,
    pub blob: Blob,
}

#[derive(Debug, Clone)]
pub struct UploadDocumentContext {
    pub request: UploadDocumentRequest,
    pub employee_id: Option<EmployeeId>,
    pub location: Option<StorageLocation>,
    pub record: Option<DocumentRecord>,
}

impl UploadDocumentContext {
    pub fn new(request: UploadDocumentRequest) -> Self {
        Self {
            request,
            employee_id: None,
            location: None,
            record: None,
        }
    }
}

/// `area` is the object-store area documents are written to.
pub fn upload_document_saga(backends: &Backends, area: impl Into<String>) -> ProvisioningSaga<UploadDocumentContext> {
    ProvisioningSaga::new("upload_document")
        .step(ResolveOwnerEmployee {
            records: Arc::clone(&backends.records),
        })
        .step(UploadBlob {
            objects: Arc::clone(&backends.objects),
            area: area.into(),
        })
        .step(InsertDocumentRecord {
            records: Arc::clone(&backends.records),
        })
}

struct ResolveOwnerEmployee {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<UploadDocumentContext, ProvisioningError> for ResolveOwnerEmployee {
    type Output = ();

    fn name(&self) -> &'static str {
        "resolve_owner_employee"
    }

    async fn forward(&self, ctx: &mut UploadDocumentContext) -> Result<(), ProvisioningError> {
        let request = &ctx.request;
        require_non_blank("file name", &request.file_name)?;
        if request.blob.is_empty() {
            return Err(ProvisioningError::validation("document is empty"));
        }

        let owner = Filter::eq(fields::IDENTITY_ID, request.owner.to_string());
        let user: Option<UserRecord> = self.records.select_one(collections::USERS, &owner).await?;
        let employee_id = match user.and_then(|u| u.employee_id) {
            Some(id) => id,
            None => {
                let employee: Option<EmployeeRecord> =
                    self.records.select_one(collections::EMPLOYEES, &owner).await?;
                employee.map(|e| e.employee_id).ok_or_else(|| {
                    ProvisioningError::validation(format!(
                        "identity {} is not linked to an employee",
                        request.owner
                    ))
                })?
            }
        };
        ctx.employee_id = Some(employee_id);
        Ok(())
    }
}

struct UploadBlob {
    objects: Arc<dyn ObjectStore>,
    area: String,
}

#[async_trait]
impl SagaStep<UploadDocumentContext, ProvisioningError> for UploadBlob {
    type Output = StorageLocation;

    fn name(&self) -> &'static str {
        "upload_blob"
    }

    async fn forward(&self, ctx: &mut UploadDocumentContext) -> Result<StorageLocation, ProvisioningError> {
        let employee_id = ctx
            .employee_id
            .as_ref()
            .ok_or_else(|| ProvisioningError::invariant("owner employee not resolved"))?;
        let request = &ctx.request;
        let location = document_location(
            &self.area,
            employee_id,
            request.document_type,
            &request.file_name,
            &new_disambiguator(),
        );

        self.objects
            .upload(&location.area, &location.path, request.blob.clone())
            .await?;
        ctx.location = Some(location.clone());
        Ok(location)
    }

    async fn compensate(
        &self,
        _ctx: &UploadDocumentContext,
        location: &StorageLocation,
    ) -> Result<(), ProvisioningError> {
        self.objects
            .remove(&location.area, std::slice::from_ref(&location.path))
            .await?;
        Ok(())
    }

    fn residue(&self, location: &StorageLocation) -> String {
        format!("orphaned object {location}")
    }
}

struct InsertDocumentRecord {
    records: Arc<dyn RecordStore>,
}

#[async_trait]
impl SagaStep<UploadDocumentContext, ProvisioningError> for InsertDocumentRecord {
    type Output = DocumentId;

    fn name(&self) -> &'static str {
        "insert_document_record"
    }

    async fn forward(&self, ctx: &mut UploadDocumentContext) -> Result<DocumentId, ProvisioningError> {
        let (Some(employee_id), Some(location)) = (ctx.employee_id.clone(), ctx.location.clone()) else {
            return Err(ProvisioningError::invariant("blob not uploaded yet"));
        };
        let request = &ctx.request;
        let record = DocumentRecord {
            document_id: DocumentId::new(),
            owner: request.owner,
            employee_id,
            document_type: request.document_type,
            file_name: request.file_name.trim().to_string(),
            location,
            content_type: request.blob.content_type.clone(),
            uploaded_by: request.uploaded_by,
            uploaded_at: Utc::now(),
        };

        let stored = self.records.insert_typed(collections::DOCUMENTS, &record).await?;
        let id = *stored.id();
        ctx.record = Some(stored);
        Ok(id)
    }

    async fn compensate(&self, _ctx: &UploadDocumentContext, id: &DocumentId) -> Result<(), ProvisioningError> {
        self.records
            .delete(collections::DOCUMENTS, &Filter::eq(fields::DOCUMENT_ID, id.to_string()))
            .await?;
        Ok(())
    }

    fn residue(&self, id: &DocumentId) -> String {
        format!("{} row {id}", collections::DOCUMENTS)
    }
}
