//! Relational record store boundary.
//!
//! Records are JSON objects grouped in named collections. All operations are
//! single-row or filtered-set; there are no multi-statement transactions.

pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use in_memory::{InMemoryRecordStore, StoreOp};

/// Conjunction of field equality tests.
///
/// A missing field compares equal to `null`, so `Filter::eq("identity_id",
/// JsonValue::Null)` also matches rows that never had the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, JsonValue)>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn is_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Value required for `field`, if the filter constrains it.
    pub fn value_of(&self, field: &str) -> Option<&JsonValue> {
        self.clauses
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn matches(&self, record: &JsonValue) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            let actual = record.get(field).unwrap_or(&JsonValue::Null);
            actual == expected
        })
    }
}

impl core::fmt::Display for Filter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("*");
        }
        for (i, (field, value)) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{field} = {value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no record in '{collection}' matches {filter}")]
    NotFound { collection: String, filter: String },

    #[error("conflict in '{collection}': {reason}")]
    Conflict { collection: String, reason: String },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Relational store capability.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record (must be a JSON object); returns the stored record.
    async fn insert(&self, collection: &str, record: JsonValue) -> Result<JsonValue, StoreError>;

    /// Shallow-merge `patch` into every matching record; returns the updated
    /// records (possibly none).
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: JsonValue,
    ) -> Result<Vec<JsonValue>, StoreError>;

    /// Delete matching records; returns how many were removed.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn select(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>, StoreError>;
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn insert(&self, collection: &str, record: JsonValue) -> Result<JsonValue, StoreError> {
        (**self).insert(collection, record).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: JsonValue,
    ) -> Result<Vec<JsonValue>, StoreError> {
        (**self).update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        (**self).delete(collection, filter).await
    }

    async fn select(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>, StoreError> {
        (**self).select(collection, filter).await
    }
}

/// Typed helpers over [`RecordStore`].
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    async fn insert_typed<T>(&self, collection: &str, record: &T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let stored = self.insert(collection, serde_json::to_value(record)?).await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn select_typed<T>(&self, collection: &str, filter: &Filter) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        self.select(collection, filter)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    /// First matching record, if any.
    async fn select_one<T>(&self, collection: &str, filter: &Filter) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        match self.select(collection, filter).await?.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_field_matches_null() {
        let row = json!({ "employee_id": "E-1" });
        assert!(Filter::eq("identity_id", JsonValue::Null).matches(&row));
        assert!(!Filter::eq("identity_id", "x").matches(&row));
    }

    #[test]
    fn conjunction_requires_every_clause() {
        let row = json!({ "employee_id": "E-1", "identity_id": null });
        let filter = Filter::eq("employee_id", "E-1").and("identity_id", JsonValue::Null);
        assert!(filter.matches(&row));
        assert!(!Filter::eq("employee_id", "E-2").and("identity_id", JsonValue::Null).matches(&row));
        assert!(Filter::all().matches(&row));
    }

    #[test]
    fn display_lists_clauses() {
        let filter = Filter::eq("a", 1).and("b", "x");
        assert_eq!(filter.to_string(), "a = 1 and b = \"x\"");
        assert_eq!(Filter::all().to_string(), "*");
    }
}
