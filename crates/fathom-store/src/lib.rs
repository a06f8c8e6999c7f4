//! In-memory implementation of the [`Store`] trait.
//!
//! Namespaces are hierarchical string vectors; values are arbitrary JSON.
//! Useful for tests and as the reference consistency model: writes through
//! a handle are immediately visible to reads through the same handle.

use std::collections::HashMap;

use async_trait::async_trait;
use fathom_core::{FathomError, Item, Store};
use serde_json::Value;
use tokio::sync::RwLock;

/// An in-memory, namespace-partitioned key-value store.
#[derive(Default)]
pub struct InMemoryStore {
    // namespace (joined) -> key -> item
    items: RwLock<HashMap<Vec<String>, HashMap<String, Item>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned_namespace(namespace: &[&str]) -> Vec<String> {
    namespace.iter().map(|s| s.to_string()).collect()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, namespace: &[&str], key: &str) -> Result<Option<Item>, FathomError> {
        let items = self.items.read().await;
        Ok(items
            .get(&owned_namespace(namespace))
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn search(
        &self,
        namespace: &[&str],
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Item>, FathomError> {
        let items = self.items.read().await;
        let Some(ns) = items.get(&owned_namespace(namespace)) else {
            return Ok(vec![]);
        };

        let mut results: Vec<Item> = ns
            .values()
            .filter(|item| match query {
                Some(q) => item.key.contains(q) || item.value.to_string().contains(q),
                None => true,
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results.truncate(limit);
        Ok(results)
    }

    async fn put(&self, namespace: &[&str], key: &str, value: Value) -> Result<(), FathomError> {
        let ns = owned_namespace(namespace);
        let mut items = self.items.write().await;
        let bucket = items.entry(ns.clone()).or_default();
        let timestamp = now();
        match bucket.get_mut(key) {
            Some(existing) => {
                existing.value = value;
                existing.updated_at = timestamp;
            }
            None => {
                bucket.insert(
                    key.to_string(),
                    Item {
                        namespace: ns,
                        key: key.to_string(),
                        value,
                        created_at: timestamp.clone(),
                        updated_at: timestamp,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, namespace: &[&str], key: &str) -> Result<(), FathomError> {
        let mut items = self.items.write().await;
        if let Some(bucket) = items.get_mut(&owned_namespace(namespace)) {
            bucket.remove(key);
        }
        Ok(())
    }

    async fn list_namespaces(&self, prefix: &[&str]) -> Result<Vec<Vec<String>>, FathomError> {
        let items = self.items.read().await;
        let mut namespaces: Vec<Vec<String>> = items
            .keys()
            .filter(|ns| {
                prefix.len() <= ns.len()
                    && prefix.iter().zip(ns.iter()).all(|(p, n)| *p == n.as_str())
            })
            .cloned()
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }
}
