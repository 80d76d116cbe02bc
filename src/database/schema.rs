use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{Document, StoreError, StoreResult};

/// A record type that can back a collection.
///
/// Documents are normalised through the type on every write: unknown fields
/// are dropped, serde defaults are filled in and a document that does not
/// fit is rejected with [`StoreError::Validation`].
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection (table partition) name
    const COLLECTION: &'static str;

    /// Name of the identifier field written by the store
    const PRIMARY_KEY: &'static str = "_id";

    /// Fields whose non-null values must be distinct across the collection
    const UNIQUE: &'static [&'static str] = &[];
}

/// Type-erased view of a [`Resource`], held by storage handles.
#[derive(Clone, Copy)]
pub struct DocumentSchema {
    pub collection: &'static str,
    pub primary_key: &'static str,
    pub unique: &'static [&'static str],
    normalize: fn(Document) -> StoreResult<Document>,
}

impl DocumentSchema {
    pub fn of<T: Resource>() -> Self {
        Self {
            collection: T::COLLECTION,
            primary_key: T::PRIMARY_KEY,
            unique: T::UNIQUE,
            normalize: normalize_as::<T>,
        }
    }

    /// Normalises `doc` and stamps it with `id` under the primary key.
    pub fn prepare(&self, id: &str, mut doc: Document) -> StoreResult<Document> {
        doc.remove(self.primary_key);
        let mut normalized = (self.normalize)(doc)?;
        normalized.insert(self.primary_key.to_string(), Value::String(id.to_string()));
        Ok(normalized)
    }

    /// Applies a partial update on top of `existing` and re-validates the result.
    pub fn merge(&self, id: &str, existing: &Document, patch: Document) -> StoreResult<Document> {
        let mut merged = existing.clone();
        for (key, value) in patch {
            if key != self.primary_key {
                merged.insert(key, value);
            }
        }
        self.prepare(id, merged)
    }

    /// Fails with [`StoreError::Duplicate`] when `candidate` repeats a unique
    /// value held by any other record in `records`.
    pub fn check_unique(&self, candidate: &Document, records: &[Document]) -> StoreResult<()> {
        let id = candidate.get(self.primary_key);
        for &field in self.unique {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = records
                .iter()
                .any(|doc| doc.get(self.primary_key) != id && doc.get(field) == Some(value));
            if taken {
                return Err(StoreError::Duplicate { field: field.to_string() });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DocumentSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSchema")
            .field("collection", &self.collection)
            .field("primary_key", &self.primary_key)
            .field("unique", &self.unique)
            .finish()
    }
}

fn normalize_as<T: Resource>(doc: Document) -> StoreResult<Document> {
    let typed: T = serde_json::from_value(Value::Object(doc)).map_err(validation_error)?;
    match serde_json::to_value(typed)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::validation("Record must serialize to a JSON object")),
    }
}

/// Maps serde's messages onto field errors where the field can be recovered.
fn validation_error(err: serde_json::Error) -> StoreError {
    let message = err.to_string();

    if let Some(field) = backticked(&message, "missing field `") {
        return StoreError::field(field, "This field is required");
    }
    if let Some(field) = backticked(&message, "unknown field `") {
        return StoreError::field(field, "Unknown field");
    }

    StoreError::validation(message)
}

fn backticked<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = message.strip_prefix(prefix)?;
    rest.split('`').next()
}
