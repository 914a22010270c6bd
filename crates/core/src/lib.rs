//! `hrdesk-core` — record model and pure derivations shared by every layer.
//!
//! This crate contains **no IO**: identifiers, relational record shapes, role
//! and status values, and the storage addressing rules that sagas and their
//! compensations both rely on.

pub mod entity;
pub mod error;
pub mod id;
pub mod records;
pub mod role;
pub mod storage;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, EmployeeId, IdentityId};
pub use records::{
    DocumentRecord, DocumentType, EmployeeRecord, NewEmployee, UserRecord, UserStatus, collections,
    fields,
};
pub use role::Role;
pub use storage::{EmployeeStorage, EmployeeStorageLayout, StorageLocation};
