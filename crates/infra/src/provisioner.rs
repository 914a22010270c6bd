//! Entry point for the compound operations.
//!
//! Saga definitions are built once from the configuration and reused; every
//! run goes through the same coordinator.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use hrdesk_auth::{Landing, ResolvedIdentity, landing};
use hrdesk_saga::SagaCoordinator;

use crate::config::HrConfig;
use crate::identity::{Credentials, IdentityError, IdentityService, Session};
use crate::object_store::{AreaOptions, ObjectStore, ObjectStoreError};
use crate::record_store::RecordStore;
use crate::saga::{
    Backends, CreateEmployeeContext, CreateEmployeeRequest, CreateUserContext, CreateUserRequest, DeleteUserContext,
    DeleteUserRequest, ProvisioningError, ProvisioningSaga, SagaResult, UploadDocumentContext, UploadDocumentRequest,
    create_employee_saga, create_user_saga, delete_user_saga, upload_document_saga,
};
use crate::session::SessionResolver;

pub struct Provisioner {
    config: HrConfig,
    backends: Backends,
    coordinator: SagaCoordinator,
    create_user: ProvisioningSaga<CreateUserContext>,
    create_employee: ProvisioningSaga<CreateEmployeeContext>,
    upload_document: ProvisioningSaga<UploadDocumentContext>,
    delete_user: ProvisioningSaga<DeleteUserContext>,
}

impl core::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(
        config: HrConfig,
        identity: Arc<dyn IdentityService>,
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let backends = Backends {
            identity,
            records,
            objects,
        };
        Self {
            coordinator: config.coordinator(),
            create_user: create_user_saga(&backends, config.role_scheme.clone()),
            create_employee: create_employee_saga(&backends, config.employee_storage.clone()),
            upload_document: upload_document_saga(&backends, config.document_area.clone()),
            delete_user: delete_user_saga(&backends),
            backends,
            config,
        }
    }

    pub fn config(&self) -> &HrConfig {
        &self.config
    }

    /// Create the shared areas the sagas write into. Existing areas are kept.
    pub async fn bootstrap(&self) -> Result<(), ProvisioningError> {
        for area in self.config.shared_areas() {
            match self.backends.objects.create_area(area, AreaOptions::private()).await {
                Ok(()) => info!(area, "storage area created"),
                Err(ObjectStoreError::AreaExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> SagaResult<CreateUserContext> {
        let ctx = self.coordinator.run(&self.create_user, CreateUserContext::new(request)).await?;
        info!(
            identity_id = ?ctx.identity_id,
            employee_id = ?ctx.request.employee_id,
            role = %ctx.request.role,
            "user created"
        );
        Ok(ctx)
    }

    pub async fn create_employee(&self, request: CreateEmployeeRequest) -> SagaResult<CreateEmployeeContext> {
        let ctx = self
            .coordinator
            .run(&self.create_employee, CreateEmployeeContext::new(request))
            .await?;
        info!(employee_id = %ctx.request.employee.employee_id, "employee created");
        Ok(ctx)
    }

    pub async fn upload_document(&self, request: UploadDocumentRequest) -> SagaResult<UploadDocumentContext> {
        let ctx = self
            .coordinator
            .run(&self.upload_document, UploadDocumentContext::new(request))
            .await?;
        if let Some(location) = &ctx.location {
            info!(owner = %ctx.request.owner, location = %location, "document uploaded");
        }
        Ok(ctx)
    }

    pub async fn delete_user(&self, request: DeleteUserRequest) -> SagaResult<DeleteUserContext> {
        let ctx = self.coordinator.run(&self.delete_user, DeleteUserContext::new(request)).await?;
        info!(identity_id = %ctx.request.identity_id, "user deleted");
        Ok(ctx)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, IdentityError> {
        self.backends.identity.sign_in(credentials).await
    }

    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        self.backends.identity.sign_out().await
    }

    /// Start a resolver fed by the identity service's session notifications.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_session_resolver(&self) -> (Arc<SessionResolver>, JoinHandle<()>) {
        let resolver = SessionResolver::new(Arc::clone(&self.backends.records), self.config.role_scheme.clone());
        let listener = resolver.listen(self.backends.identity.subscribe());
        (resolver, listener)
    }

    /// Where a resolved identity should land after sign-in.
    pub fn landing(&self, resolved: &ResolvedIdentity) -> Landing {
        landing(resolved, &self.config.role_scheme)
    }
}
