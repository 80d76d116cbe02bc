use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ordering::sort_documents;
use super::{Collection, Document, DocumentSchema, PageQuery, StoreResult};

/// In-process collection. Records are kept in insertion order, which is also
/// the natural order used to break sort ties.
pub struct MemoryCollection {
    schema: DocumentSchema,
    records: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(schema: DocumentSchema) -> Self {
        Self {
            schema,
            records: RwLock::new(Vec::new()),
        }
    }

    fn id_of<'a>(&self, doc: &'a Document) -> Option<&'a str> {
        doc.get(self.schema.primary_key).and_then(Value::as_str)
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        self.schema.collection
    }

    fn primary_key(&self) -> &str {
        self.schema.primary_key
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        Ok(self.records.read().await.clone())
    }

    async fn find_page(&self, query: &PageQuery) -> StoreResult<Vec<Document>> {
        let records = self.records.read().await;
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);

        let page = match &query.sort {
            Some(sort) => {
                let mut sorted = records.clone();
                sort_documents(&mut sorted, sort);
                sorted.into_iter().skip(skip).take(limit).collect()
            }
            None => records.iter().skip(skip).take(limit).cloned().collect(),
        };
        Ok(page)
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|doc| self.id_of(doc) == Some(id)).cloned())
    }

    async fn find_one_by(&self, field: &str, value: &Value) -> StoreResult<Option<Document>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|doc| doc.get(field) == Some(value)).cloned())
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn insert(&self, doc: Document) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let prepared = self.schema.prepare(&id, doc)?;
        // Check and push under one write lock so concurrent inserts cannot both pass
        let mut records = self.records.write().await;
        self.schema.check_unique(&prepared, &records)?;
        records.push(prepared);
        Ok(id)
    }

    async fn update_by_id(&self, id: &str, patch: Document) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let Some(index) = records.iter().position(|doc| self.id_of(doc) == Some(id)) else {
            return Ok(false);
        };
        let merged = self.schema.merge(id, &records[index], patch)?;
        self.schema.check_unique(&merged, &records)?;
        records[index] = merged;
        Ok(true)
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|doc| self.id_of(doc) != Some(id));
        Ok(records.len() != before)
    }
}
