//! Key-value store capability

use async_trait::async_trait;

use crate::types::Result;

/// Durable key-value store holding identities, content, dedup markers and
/// the reward cursor.
///
/// Each operation is atomic on its own; there are no multi-key transactions.
/// A key holds exactly one kind of value (plain string, hash, or set).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Create the key only if it does not exist yet.
    ///
    /// Returns `true` when this call created it.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Returns `true` when the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    /// Create a hash holding `fields` only if the key does not exist yet.
    ///
    /// Returns `true` when this call created it.
    async fn hash_create(&self, key: &str, fields: &[(&str, String)]) -> Result<bool>;

    /// Add `delta` to an integer hash field (missing counts as 0) and return
    /// the new value.
    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Returns `true` when the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Returns `true` when the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool>;
}
