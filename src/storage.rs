//! Bundled in-memory implementation of the [`StatusStore`] contract.
//!
//! Production deployments put a real database behind the same trait; this
//! store keeps records in a `BTreeMap` so the ordered scan the status query
//! needs falls out of the key order.

use crate::core::{ServerRecord, StatusStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, ServerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with records, for tests and local runs.
    pub async fn preload<I: IntoIterator<Item = ServerRecord>>(&self, records: I) {
        let mut guard = self.records.write().await;
        for record in records {
            guard.insert(record.server_name.clone(), record);
        }
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn get(&self, server_name: &str) -> Result<Option<ServerRecord>, StoreError> {
        Ok(self.records.read().await.get(server_name).cloned())
    }

    async fn upsert(&self, record: ServerRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.server_name.clone(), record);
        Ok(())
    }

    async fn list(&self, filter: Option<&str>) -> Result<Vec<ServerRecord>, StoreError> {
        let guard = self.records.read().await;
        match filter {
            Some(name) => Ok(guard.get(name).cloned().into_iter().collect()),
            None => Ok(guard.values().cloned().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ServerRecord {
        ServerRecord {
            server_name: name.to_string(),
            status: "online".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_name() {
        let store = MemoryStore::new();
        store.upsert(record("a.example.org")).await.unwrap();

        let mut updated = record("a.example.org");
        updated.status = "offline".to_string();
        store.upsert(updated).await.unwrap();

        let fetched = store.get("a.example.org").await.unwrap().unwrap();
        assert_eq!(fetched.status, "offline");
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_name() {
        let store = MemoryStore::new();
        store
            .preload([record("c.example"), record("a.example"), record("b.example")])
            .await;

        let names: Vec<String> = store
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.server_name)
            .collect();
        assert_eq!(names, vec!["a.example", "b.example", "c.example"]);
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let store = MemoryStore::new();
        store.preload([record("a.example"), record("b.example")]).await;

        let filtered = store.list(Some("b.example")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].server_name, "b.example");
        assert!(store.list(Some("missing")).await.unwrap().is_empty());
    }
}
