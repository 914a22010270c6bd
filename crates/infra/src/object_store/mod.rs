//! Object (blob) store boundary: named areas holding path-addressed blobs.

pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use in_memory::{InMemoryObjectStore, ObjectOp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Zero-length placeholder (folder markers).
    pub fn empty() -> Self {
        Self::new(Vec::new(), "application/octet-stream")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AreaOptions {
    pub public: bool,
}

impl AreaOptions {
    pub fn private() -> Self {
        Self { public: false }
    }
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub path: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("storage area not found: {0}")]
    AreaNotFound(String),

    #[error("storage area already exists: {0}")]
    AreaExists(String),

    #[error("object already exists: {area}/{path}")]
    ObjectExists { area: String, path: String },

    #[error("object not found: {area}/{path}")]
    ObjectNotFound { area: String, path: String },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Object store capability.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_area(&self, name: &str, options: AreaOptions) -> Result<(), ObjectStoreError>;

    /// Remove an area together with everything in it.
    async fn remove_area(&self, name: &str) -> Result<(), ObjectStoreError>;

    /// Store a blob; uploading onto an existing path is a conflict.
    async fn upload(&self, area: &str, path: &str, blob: Blob) -> Result<(), ObjectStoreError>;

    /// Remove the given paths. Missing paths are ignored.
    async fn remove(&self, area: &str, paths: &[String]) -> Result<(), ObjectStoreError>;

    async fn list(&self, area: &str, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError>;

    async fn download(&self, area: &str, path: &str) -> Result<Blob, ObjectStoreError>;
}

#[async_trait]
impl<S> ObjectStore for Arc<S>
where
    S: ObjectStore + ?Sized,
{
    async fn create_area(&self, name: &str, options: AreaOptions) -> Result<(), ObjectStoreError> {
        (**self).create_area(name, options).await
    }

    async fn remove_area(&self, name: &str) -> Result<(), ObjectStoreError> {
        (**self).remove_area(name).await
    }

    async fn upload(&self, area: &str, path: &str, blob: Blob) -> Result<(), ObjectStoreError> {
        (**self).upload(area, path, blob).await
    }

    async fn remove(&self, area: &str, paths: &[String]) -> Result<(), ObjectStoreError> {
        (**self).remove(area, paths).await
    }

    async fn list(&self, area: &str, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError> {
        (**self).list(area, prefix).await
    }

    async fn download(&self, area: &str, path: &str) -> Result<Blob, ObjectStoreError> {
        (**self).download(area, path).await
    }
}
