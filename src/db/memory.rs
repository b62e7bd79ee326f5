//! In-memory store backend (dev mode and tests)

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

use super::store::Store;
use crate::types::{RelayError, Result};

#[derive(Debug, Clone)]
enum Entry {
    Value(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "string",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
        }
    }
}

fn wrong_type(key: &str, found: &Entry, wanted: &str) -> RelayError {
    RelayError::Store(format!(
        "key {} holds a {}, expected a {}",
        key,
        found.kind(),
        wanted
    ))
}

/// Store backed by a concurrent map. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match entry.value() {
                Entry::Value(v) => Ok(Some(v.clone())),
                other => Err(wrong_type(key, other, "string")),
            },
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(key.to_string(), Entry::Value(value.to_string()));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(_) => Ok(false),
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::Value(value.to_string()));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match entry.value() {
                Entry::Hash(h) => Ok(h.get(field).cloned()),
                other => Err(wrong_type(key, other, "hash")),
            },
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry.value_mut() {
            Entry::Hash(h) => {
                for (field, value) in fields {
                    h.insert((*field).to_string(), value.clone());
                }
                Ok(())
            }
            other => Err(wrong_type(key, other, "hash")),
        }
    }

    async fn hash_create(&self, key: &str, fields: &[(&str, String)]) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(_) => Ok(false),
            MapEntry::Vacant(slot) => {
                let hash = fields
                    .iter()
                    .map(|(field, value)| ((*field).to_string(), value.clone()))
                    .collect();
                slot.insert(Entry::Hash(hash));
                Ok(true)
            }
        }
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry.value_mut() {
            Entry::Hash(h) => {
                let current = match h.get(field) {
                    None => 0,
                    Some(raw) => raw.parse::<i64>().map_err(|_| {
                        RelayError::Store(format!("field {}.{} is not an integer", key, field))
                    })?,
                };
                let next = current.checked_add(delta).ok_or_else(|| {
                    RelayError::Store(format!("field {}.{} would overflow", key, field))
                })?;
                h.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            other => Err(wrong_type(key, other, "hash")),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()));
        match entry.value_mut() {
            Entry::Set(s) => Ok(s.insert(member.to_string())),
            other => Err(wrong_type(key, other, "set")),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        match self.entries.get_mut(key) {
            None => Ok(false),
            Some(mut entry) => match entry.value_mut() {
                Entry::Set(s) => Ok(s.remove(member)),
                other => Err(wrong_type(key, other, "set")),
            },
        }
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        match self.entries.get(key) {
            None => Ok(false),
            Some(entry) => match entry.value() {
                Entry::Set(s) => Ok(s.contains(member)),
                other => Err(wrong_type(key, other, "set")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_set_if_absent_only_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("LPGa", "1").await.unwrap());
        assert!(!store.set_if_absent("LPGa", "1").await.unwrap());
        assert!(store.exists("LPGa").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = MemoryStore::new();
        assert!(!store.delete("missing").await.unwrap());
        assert_ok!(store.set("k", "v").await);
        assert!(store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_hash_fields() {
        let store = MemoryStore::new();
        store
            .hash_set("IPG1", &[("name", "alice".into()), ("public_key", "pk".into())])
            .await
            .unwrap();
        assert_eq!(store.hash_get("IPG1", "name").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(store.hash_get("IPG1", "other").await.unwrap(), None);
        assert_eq!(store.hash_get("IPG2", "name").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_create_keeps_first_writer() {
        let store = MemoryStore::new();
        assert!(store
            .hash_create("PPG9", &[("id", "IPG1".into())])
            .await
            .unwrap());
        assert!(!store
            .hash_create("PPG9", &[("id", "IPG2".into())])
            .await
            .unwrap());
        assert_eq!(store.hash_get("PPG9", "id").await.unwrap().as_deref(), Some("IPG1"));
    }

    #[tokio::test]
    async fn test_hash_increment() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_increment("IPG1", "vest", 5).await.unwrap(), 5);
        assert_eq!(store.hash_increment("IPG1", "vest", 7).await.unwrap(), 12);

        store.hash_set("IPG1", &[("name", "alice".into())]).await.unwrap();
        assert_err!(store.hash_increment("IPG1", "name", 1).await);
    }

    #[tokio::test]
    async fn test_sets() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "a").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());
        assert!(store.set_is_member("s", "a").await.unwrap());
        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(!store.set_is_member("s", "a").await.unwrap());
        assert!(!store.set_remove("nope", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_error() {
        let store = MemoryStore::new();
        store.set("plain", "1").await.unwrap();
        assert_err!(store.hash_get("plain", "f").await);
        assert_err!(store.set_add("plain", "m").await);
    }
}
