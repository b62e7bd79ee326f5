//! MongoDB store backend
//!
//! One document per key in a single collection:
//!
//! ```text
//! { _id: <key>, value: <string>, fields: { <field>: <value> }, members: [<member>] }
//! ```
//!
//! Only the part matching the key's kind is present. `set_if_absent` and
//! `hash_create` rely on the unique `_id` index, so two concurrent creators
//! cannot both win.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};
use tracing::info;

use super::store::Store;
use crate::types::{RelayError, Result};

const DUPLICATE_KEY: i32 = 11000;

/// Store backed by a MongoDB collection
#[derive(Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect and verify the server answers a ping
    pub async fn connect(uri: &str, db_name: &str, collection: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast on an unreachable server instead of hanging startup
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| RelayError::Store(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| RelayError::Store(format!("MongoDB ping failed: {}", e)))?;

        info!(db = db_name, collection, "Connected to MongoDB");

        Ok(Self {
            collection: client.database(db_name).collection(collection),
        })
    }

    async fn find(&self, key: &str) -> Result<Option<Document>> {
        Ok(self.collection.find_one(doc! { "_id": key }).await?)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

fn bson_to_string(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(d) => Some(d.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field_path(field: &str) -> String {
    format!("fields.{}", field)
}

#[async_trait]
impl Store for MongoStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .find(key)
            .await?
            .and_then(|d| d.get("value").and_then(bson_to_string)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.collection
            .update_one(doc! { "_id": key }, doc! { "$set": { "value": value } })
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        match self
            .collection
            .insert_one(doc! { "_id": key, "value": value })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": key }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count = self
            .collection
            .count_documents(doc! { "_id": key })
            .limit(1)
            .await?;
        Ok(count > 0)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let path = field_path(field);
        let found = self
            .collection
            .find_one(doc! { "_id": key })
            .projection(doc! { path: 1 })
            .await?;
        Ok(found.and_then(|d| {
            d.get_document("fields")
                .ok()
                .and_then(|fields| fields.get(field).and_then(bson_to_string))
        }))
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut set = Document::new();
        for (field, value) in fields {
            set.insert(field_path(field), value.clone());
        }
        self.collection
            .update_one(doc! { "_id": key }, doc! { "$set": set })
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn hash_create(&self, key: &str, fields: &[(&str, String)]) -> Result<bool> {
        let mut values = Document::new();
        for (field, value) in fields {
            values.insert(*field, value.clone());
        }
        match self
            .collection
            .insert_one(doc! { "_id": key, "fields": values })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let path = field_path(field);
        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": key }, doc! { "$inc": { path: delta } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| RelayError::Store(format!("increment of {} returned nothing", key)))?;

        updated
            .get_document("fields")
            .ok()
            .and_then(|fields| match fields.get(field) {
                Some(Bson::Int64(v)) => Some(*v),
                Some(Bson::Int32(v)) => Some(i64::from(*v)),
                _ => None,
            })
            .ok_or_else(|| RelayError::Store(format!("field {}.{} is not an integer", key, field)))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(doc! { "_id": key }, doc! { "$addToSet": { "members": member } })
            .upsert(true)
            .await?;
        Ok(result.modified_count > 0 || result.upserted_id.is_some())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(doc! { "_id": key }, doc! { "$pull": { "members": member } })
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        let count = self
            .collection
            .count_documents(doc! { "_id": key, "members": member })
            .limit(1)
            .await?;
        Ok(count > 0)
    }
}
