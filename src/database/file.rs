use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ordering::sort_documents;
use super::{Collection, Document, DocumentSchema, PageQuery, StoreResult};

/// Collection persisted as a JSON array in `<dir>/<collection>.json`.
///
/// The file is read once, on first access, and cached. Every write goes to a
/// copy of the cache which replaces it only after the copy has been written
/// to a temp file and renamed over the data file, so a failed write changes
/// neither the cache nor the file.
pub struct FileCollection {
    schema: DocumentSchema,
    path: PathBuf,
    records: Mutex<Option<Vec<Document>>>,
}

impl FileCollection {
    pub fn new(directory: &Path, schema: DocumentSchema) -> Self {
        Self {
            path: directory.join(format!("{}.json", schema.collection)),
            schema,
            records: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn id_of<'a>(&self, doc: &'a Document) -> Option<&'a str> {
        doc.get(self.schema.primary_key).and_then(Value::as_str)
    }

    async fn load(&self) -> StoreResult<Vec<Document>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, records: &[Document]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(records)?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    /// Runs `read` against the cached records, loading them first if needed.
    async fn read<R>(&self, read: impl FnOnce(&[Document]) -> R) -> StoreResult<R> {
        let mut guard = self.records.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(read(guard.as_deref().unwrap_or_default()))
    }

    /// Applies `change` to a copy of the records and commits it once the
    /// copy is on disk. Nothing is written when `change` returns `Ok(None)`.
    async fn write<R>(
        &self,
        change: impl FnOnce(&mut Vec<Document>) -> StoreResult<Option<R>>,
    ) -> StoreResult<Option<R>> {
        let mut guard = self.records.lock().await;
        let mut next = match guard.as_ref() {
            Some(records) => records.clone(),
            None => self.load().await?,
        };

        let Some(result) = change(&mut next)? else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(Some(result))
    }
}

#[async_trait]
impl Collection for FileCollection {
    fn name(&self) -> &str {
        self.schema.collection
    }

    fn primary_key(&self) -> &str {
        self.schema.primary_key
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        self.read(|records| records.to_vec()).await
    }

    async fn find_page(&self, query: &PageQuery) -> StoreResult<Vec<Document>> {
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);

        self.read(|records| match &query.sort {
            Some(sort) => {
                let mut sorted = records.to_vec();
                sort_documents(&mut sorted, sort);
                sorted.into_iter().skip(skip).take(limit).collect()
            }
            None => records.iter().skip(skip).take(limit).cloned().collect(),
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        self.read(|records| records.iter().find(|doc| self.id_of(doc) == Some(id)).cloned())
            .await
    }

    async fn find_one_by(&self, field: &str, value: &Value) -> StoreResult<Option<Document>> {
        self.read(|records| records.iter().find(|doc| doc.get(field) == Some(value)).cloned())
            .await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.read(|records| records.len() as u64).await
    }

    async fn insert(&self, doc: Document) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let prepared = self.schema.prepare(&id, doc)?;

        self.write(|records| {
            self.schema.check_unique(&prepared, records)?;
            records.push(prepared);
            Ok(Some(()))
        })
        .await?;
        Ok(id)
    }

    async fn update_by_id(&self, id: &str, patch: Document) -> StoreResult<bool> {
        let updated = self
            .write(|records| {
                let Some(index) = records.iter().position(|doc| self.id_of(doc) == Some(id)) else {
                    return Ok(None);
                };
                let merged = self.schema.merge(id, &records[index], patch)?;
                self.schema.check_unique(&merged, records)?;
                records[index] = merged;
                Ok(Some(()))
            })
            .await?;
        Ok(updated.is_some())
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let deleted = self
            .write(|records| {
                let before = records.len();
                records.retain(|doc| self.id_of(doc) != Some(id));
                Ok((records.len() != before).then_some(()))
            })
            .await?;
        Ok(deleted.is_some())
    }
}
