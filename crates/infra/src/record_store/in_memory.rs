use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{Filter, RecordStore, StoreError};
use crate::faults::FaultPlan;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    Update,
    Delete,
    Select,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Vec<JsonValue>>,
    unique_keys: HashMap<String, HashSet<String>>,
}

/// In-memory record store.
///
/// Intended for tests/dev. Rows keep insertion order; unique keys are
/// declared per collection with [`with_unique_key`](Self::with_unique_key).
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<State>,
    faults: FaultPlan<(StoreOp, String)>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject inserts/updates that would duplicate a non-null `field` value.
    pub fn with_unique_key(self, collection: &str, field: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state
                .unique_keys
                .entry(collection.to_string())
                .or_default()
                .insert(field.to_string());
        }
        self
    }

    /// Make the next `op` on `collection` fail with `Unavailable`.
    pub fn fail_next(&self, op: StoreOp, collection: &str) {
        self.faults.arm((op, collection.to_string()), 1);
    }

    pub fn fail_times(&self, op: StoreOp, collection: &str, times: u32) {
        self.faults.arm((op, collection.to_string()), times);
    }

    /// Snapshot of a collection's rows.
    pub fn rows(&self, collection: &str) -> Vec<JsonValue> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.collections.get(collection).cloned())
            .unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.rows(collection).len()
    }

    fn check_fault(&self, op: StoreOp, collection: &str) -> Result<(), StoreError> {
        if self.faults.trip(&(op, collection.to_string())) {
            return Err(StoreError::Unavailable(format!(
                "injected fault on {op:?} {collection}"
            )));
        }
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

impl State {
    /// Check `candidate` against the unique keys of `collection`, ignoring the
    /// rows at `skip` (the rows being updated).
    fn check_unique(
        &self,
        collection: &str,
        candidate: &JsonValue,
        skip: &[usize],
    ) -> Result<(), StoreError> {
        let Some(keys) = self.unique_keys.get(collection) else {
            return Ok(());
        };
        let rows = self.collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);

        for key in keys {
            let value = match candidate.get(key) {
                Some(JsonValue::Null) | None => continue,
                Some(v) => v,
            };
            let clash = rows
                .iter()
                .enumerate()
                .any(|(i, row)| !skip.contains(&i) && row.get(key) == Some(value));
            if clash {
                return Err(duplicate(collection, key, value));
            }
        }
        Ok(())
    }

    /// Rows patched by one update must not collide with each other.
    fn check_unique_among(&self, collection: &str, patched: &[JsonValue]) -> Result<(), StoreError> {
        let Some(keys) = self.unique_keys.get(collection) else {
            return Ok(());
        };
        for key in keys {
            let mut seen = HashSet::new();
            for row in patched {
                let value = match row.get(key) {
                    Some(JsonValue::Null) | None => continue,
                    Some(v) => v,
                };
                if !seen.insert(value.to_string()) {
                    return Err(duplicate(collection, key, value));
                }
            }
        }
        Ok(())
    }
}

fn duplicate(collection: &str, key: &str, value: &JsonValue) -> StoreError {
    StoreError::Conflict {
        collection: collection.to_string(),
        reason: format!("duplicate {key} = {value}"),
    }
}

fn merge(target: &mut JsonValue, patch: &JsonValue) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (field, value) in patch {
            target.insert(field.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, collection: &str, record: JsonValue) -> Result<JsonValue, StoreError> {
        self.check_fault(StoreOp::Insert, collection)?;
        if !record.is_object() {
            return Err(StoreError::Rejected(format!(
                "records in '{collection}' must be JSON objects"
            )));
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.check_unique(collection, &record, &[])?;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: JsonValue,
    ) -> Result<Vec<JsonValue>, StoreError> {
        self.check_fault(StoreOp::Update, collection)?;
        if !patch.is_object() {
            return Err(StoreError::Rejected("patch must be a JSON object".to_string()));
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let targets: Vec<usize> = state
            .collections
            .get(collection)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, row)| filter.matches(row))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();

        // Validate every candidate before touching any row.
        let mut patched = Vec::with_capacity(targets.len());
        for &i in &targets {
            let mut row = state.collections[collection][i].clone();
            merge(&mut row, &patch);
            state.check_unique(collection, &row, &targets)?;
            patched.push(row);
        }
        state.check_unique_among(collection, &patched)?;

        let Some(rows) = state.collections.get_mut(collection) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::with_capacity(patched.len());
        for (&i, row) in targets.iter().zip(patched) {
            rows[i] = row.clone();
            updated.push(row);
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.check_fault(StoreOp::Delete, collection)?;

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let Some(rows) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn select(&self, collection: &str, filter: &Filter) -> Result<Vec<JsonValue>, StoreError> {
        self.check_fault(StoreOp::Select, collection)?;

        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .collections
            .get(collection)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_select_update_delete() {
        let store = InMemoryRecordStore::new();
        store.insert("employees", json!({ "employee_id": "E-1" })).await.unwrap();
        store.insert("employees", json!({ "employee_id": "E-2" })).await.unwrap();

        let updated = store
            .update("employees", &Filter::eq("employee_id", "E-1"), json!({ "identity_id": "x" }))
            .await
            .unwrap();
        assert_eq!(updated, vec![json!({ "employee_id": "E-1", "identity_id": "x" })]);

        let linked = store.select("employees", &Filter::eq("identity_id", "x")).await.unwrap();
        assert_eq!(linked.len(), 1);

        let removed = store.delete("employees", &Filter::all()).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("employees"), 0);
    }

    #[tokio::test]
    async fn unique_key_conflicts() {
        let store = InMemoryRecordStore::new().with_unique_key("users", "username");
        store.insert("users", json!({ "username": "ana" })).await.unwrap();
        store.insert("users", json!({ "username": "bo" })).await.unwrap();

        let err = store.insert("users", json!({ "username": "ana" })).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let err = store
            .update("users", &Filter::eq("username", "bo"), json!({ "username": "ana" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.count("users"), 2);

        // Re-writing a row's own value is fine.
        store
            .update("users", &Filter::eq("username", "bo"), json!({ "username": "bo" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_cannot_give_matched_rows_the_same_unique_value() {
        let store = InMemoryRecordStore::new().with_unique_key("users", "username");
        store.insert("users", json!({ "username": "ana", "team": "hr" })).await.unwrap();
        store.insert("users", json!({ "username": "bo", "team": "hr" })).await.unwrap();

        let err = store
            .update("users", &Filter::eq("team", "hr"), json!({ "username": "same" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(
            store.rows("users"),
            vec![
                json!({ "username": "ana", "team": "hr" }),
                json!({ "username": "bo", "team": "hr" }),
            ]
        );

        // Patches that leave the unique key alone apply to every matched row.
        store
            .update("users", &Filter::eq("team", "hr"), json!({ "team": "ops" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn faults_are_scoped_to_collection() {
        let store = InMemoryRecordStore::new();
        store.fail_next(StoreOp::Insert, "documents");

        store.insert("users", json!({})).await.unwrap();
        assert!(matches!(
            store.insert("documents", json!({})).await,
            Err(StoreError::Unavailable(_))
        ));
        store.insert("documents", json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn non_object_records_are_rejected() {
        let store = InMemoryRecordStore::new();
        assert!(matches!(
            store.insert("users", json!([1, 2])).await,
            Err(StoreError::Rejected(_))
        ));
    }
}
