use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{AreaOptions, Blob, ObjectEntry, ObjectStore, ObjectStoreError};
use crate::faults::FaultPlan;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectOp {
    CreateArea,
    RemoveArea,
    Upload,
    Remove,
    List,
    Download,
}

#[derive(Debug, Default)]
struct Area {
    options: AreaOptions,
    objects: BTreeMap<String, Blob>,
}

/// In-memory object store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    areas: RwLock<BTreeMap<String, Area>>,
    faults: FaultPlan<ObjectOp>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, op: ObjectOp) {
        self.faults.arm(op, 1);
    }

    pub fn fail_times(&self, op: ObjectOp, times: u32) {
        self.faults.arm(op, times);
    }

    pub fn has_area(&self, name: &str) -> bool {
        self.areas.read().map(|a| a.contains_key(name)).unwrap_or(false)
    }

    pub fn is_public(&self, name: &str) -> Option<bool> {
        let areas = self.areas.read().ok()?;
        areas.get(name).map(|a| a.options.public)
    }

    pub fn contains(&self, area: &str, path: &str) -> bool {
        self.areas
            .read()
            .map(|a| a.get(area).is_some_and(|a| a.objects.contains_key(path)))
            .unwrap_or(false)
    }

    pub fn object_count(&self, area: &str) -> usize {
        self.areas
            .read()
            .map(|a| a.get(area).map_or(0, |a| a.objects.len()))
            .unwrap_or(0)
    }

    fn check_fault(&self, op: ObjectOp) -> Result<(), ObjectStoreError> {
        if self.faults.trip(&op) {
            return Err(ObjectStoreError::Unavailable(format!("injected fault on {op:?}")));
        }
        Ok(())
    }

    fn poisoned() -> ObjectStoreError {
        ObjectStoreError::Unavailable("lock poisoned".to_string())
    }
}

fn validate_path(path: &str) -> Result<(), ObjectStoreError> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(ObjectStoreError::Rejected(format!("invalid object path '{path}'")));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn create_area(&self, name: &str, options: AreaOptions) -> Result<(), ObjectStoreError> {
        self.check_fault(ObjectOp::CreateArea)?;
        if name.trim().is_empty() {
            return Err(ObjectStoreError::Rejected("area name must not be empty".to_string()));
        }

        let mut areas = self.areas.write().map_err(|_| Self::poisoned())?;
        if areas.contains_key(name) {
            return Err(ObjectStoreError::AreaExists(name.to_string()));
        }
        areas.insert(
            name.to_string(),
            Area {
                options,
                objects: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn remove_area(&self, name: &str) -> Result<(), ObjectStoreError> {
        self.check_fault(ObjectOp::RemoveArea)?;
        let mut areas = self.areas.write().map_err(|_| Self::poisoned())?;
        areas
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::AreaNotFound(name.to_string()))
    }

    async fn upload(&self, area: &str, path: &str, blob: Blob) -> Result<(), ObjectStoreError> {
        self.check_fault(ObjectOp::Upload)?;
        validate_path(path)?;

        let mut areas = self.areas.write().map_err(|_| Self::poisoned())?;
        let target = areas
            .get_mut(area)
            .ok_or_else(|| ObjectStoreError::AreaNotFound(area.to_string()))?;
        if target.objects.contains_key(path) {
            return Err(ObjectStoreError::ObjectExists {
                area: area.to_string(),
                path: path.to_string(),
            });
        }
        target.objects.insert(path.to_string(), blob);
        Ok(())
    }

    async fn remove(&self, area: &str, paths: &[String]) -> Result<(), ObjectStoreError> {
        self.check_fault(ObjectOp::Remove)?;
        let mut areas = self.areas.write().map_err(|_| Self::poisoned())?;
        let target = areas
            .get_mut(area)
            .ok_or_else(|| ObjectStoreError::AreaNotFound(area.to_string()))?;
        for path in paths {
            target.objects.remove(path);
        }
        Ok(())
    }

    async fn list(&self, area: &str, prefix: &str) -> Result<Vec<ObjectEntry>, ObjectStoreError> {
        self.check_fault(ObjectOp::List)?;
        let areas = self.areas.read().map_err(|_| Self::poisoned())?;
        let target = areas
            .get(area)
            .ok_or_else(|| ObjectStoreError::AreaNotFound(area.to_string()))?;
        Ok(target
            .objects
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, blob)| ObjectEntry {
                path: path.clone(),
                size: blob.len(),
                content_type: blob.content_type.clone(),
            })
            .collect())
    }

    async fn download(&self, area: &str, path: &str) -> Result<Blob, ObjectStoreError> {
        self.check_fault(ObjectOp::Download)?;
        let areas = self.areas.read().map_err(|_| Self::poisoned())?;
        areas
            .get(area)
            .ok_or_else(|| ObjectStoreError::AreaNotFound(area.to_string()))?
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| ObjectStoreError::ObjectNotFound {
                area: area.to_string(),
                path: path.to_string(),
            })
    }
}
