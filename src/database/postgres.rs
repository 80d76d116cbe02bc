use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{Collection, Document, DocumentSchema, PageQuery, SortSpec, StoreError, StoreResult};

/// Every collection shares one JSONB table, partitioned by collection name.
/// `seq` records insertion order and breaks sort ties.
const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        seq BIGSERIAL,
        doc JSONB NOT NULL,
        PRIMARY KEY (collection, id)
    )
"#;

/// Collection stored as JSONB rows in PostgreSQL
pub struct PgCollection {
    pool: PgPool,
    schema: DocumentSchema,
    unique_indexes: OnceCell<()>,
}

impl PgCollection {
    pub fn new(pool: PgPool, schema: DocumentSchema) -> Self {
        Self {
            pool,
            schema,
            unique_indexes: OnceCell::new(),
        }
    }

    /// Index name enforcing `field` for this collection
    fn unique_index_name(&self, field: &str) -> String {
        let clean = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                .collect()
        };
        format!("documents_{}_{}_key", clean(self.schema.collection), clean(field))
    }

    /// Partial unique expression index per unique field. DDL takes no bind
    /// parameters, so literals are quoted here; both come from code constants.
    pub fn unique_index_sql(&self, field: &str) -> String {
        let quote = |s: &str| s.replace('\'', "''");
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((doc ->> '{}')) WHERE collection = '{}'",
            self.unique_index_name(field),
            quote(field),
            quote(self.schema.collection)
        )
    }

    /// Created once per handle, before the first write.
    async fn ensure_unique_indexes(&self) -> StoreResult<()> {
        self.unique_indexes
            .get_or_try_init(|| async {
                for field in self.schema.unique {
                    sqlx::query(&self.unique_index_sql(field)).execute(&self.pool).await?;
                }
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    /// Unique violations become [`StoreError::Duplicate`] naming the field.
    fn map_write_error(&self, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let field = self
                    .schema
                    .unique
                    .iter()
                    .find(|field| db.constraint() == Some(self.unique_index_name(field).as_str()));
                if let Some(field) = field {
                    return StoreError::Duplicate { field: field.to_string() };
                }
            }
        }
        StoreError::Sqlx(err)
    }

    pub async fn ensure_table(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(pool).await?;
        tracing::info!("Document table ready");
        Ok(())
    }

    /// SELECT for one page. The sort field is bound as `$4`; the direction
    /// comes from a closed enum and is safe to splice.
    pub fn page_sql(sort: Option<&SortSpec>) -> String {
        let order = match sort {
            Some(spec) => format!("ORDER BY doc -> $4 {}, seq ASC", spec.direction.to_sql()),
            None => "ORDER BY seq ASC".to_string(),
        };
        format!(
            "SELECT doc FROM documents WHERE collection = $1 {} LIMIT $2 OFFSET $3",
            order
        )
    }

    fn decode(row: &sqlx::postgres::PgRow) -> StoreResult<Document> {
        let Json(value): Json<Value> = row.try_get("doc")?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::validation("Stored document is not a JSON object")),
        }
    }

    fn as_i64(value: u64) -> i64 {
        i64::try_from(value).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl Collection for PgCollection {
    fn name(&self) -> &str {
        self.schema.collection
    }

    fn primary_key(&self) -> &str {
        self.schema.primary_key
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT doc FROM documents WHERE collection = $1 ORDER BY seq ASC")
            .bind(self.schema.collection)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn find_page(&self, query: &PageQuery) -> StoreResult<Vec<Document>> {
        let sql = Self::page_sql(query.sort.as_ref());
        let mut q = sqlx::query(&sql)
            .bind(self.schema.collection)
            .bind(Self::as_i64(query.limit))
            .bind(Self::as_i64(query.skip));
        if let Some(sort) = &query.sort {
            q = q.bind(sort.field.clone());
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT doc FROM documents WHERE collection = $1 AND id = $2")
            .bind(self.schema.collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_one_by(&self, field: &str, value: &Value) -> StoreResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT doc FROM documents WHERE collection = $1 AND doc -> $2 = $3 ORDER BY seq ASC LIMIT 1",
        )
        .bind(self.schema.collection)
        .bind(field)
        .bind(Json(value))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1")
            .bind(self.schema.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert(&self, doc: Document) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let prepared = self.schema.prepare(&id, doc)?;
        self.ensure_unique_indexes().await?;
        sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
            .bind(self.schema.collection)
            .bind(&id)
            .bind(Json(Value::Object(prepared)))
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_write_error(e))?;
        Ok(id)
    }

    async fn update_by_id(&self, id: &str, patch: Document) -> StoreResult<bool> {
        self.ensure_unique_indexes().await?;
        // Row lock keeps the merge-validate-write sequence atomic for this document.
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT doc FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE")
            .bind(self.schema.collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        let existing = Self::decode(&row)?;
        let merged = self.schema.merge(id, &existing, patch)?;
        sqlx::query("UPDATE documents SET doc = $3 WHERE collection = $1 AND id = $2")
            .bind(self.schema.collection)
            .bind(id)
            .bind(Json(Value::Object(merged)))
            .execute(&mut *tx)
            .await
            .map_err(|e| self.map_write_error(e))?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(self.schema.collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SortDirection;

    #[test]
    fn page_sql_without_sort_uses_insertion_order() {
        let sql = PgCollection::page_sql(None);
        assert!(sql.contains("ORDER BY seq ASC"));
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"));
        assert!(!sql.contains("$4"));
    }

    #[test]
    fn page_sql_binds_sort_field_and_breaks_ties_by_seq() {
        let spec = SortSpec {
            field: "title; DROP TABLE documents".to_string(),
            direction: SortDirection::Desc,
        };
        let sql = PgCollection::page_sql(Some(&spec));
        assert!(sql.contains("ORDER BY doc -> $4 DESC, seq ASC"));
        assert!(!sql.contains("DROP"));
    }

    #[tokio::test]
    async fn unique_index_is_partial_per_collection() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Account {
            email: String,
        }
        impl crate::database::Resource for Account {
            const COLLECTION: &'static str = "user's";
            const UNIQUE: &'static [&'static str] = &["email"];
        }

        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let accounts = PgCollection::new(pool, DocumentSchema::of::<Account>());

        assert_eq!(
            accounts.unique_index_sql("email"),
            "CREATE UNIQUE INDEX IF NOT EXISTS documents_user_s_email_key \
             ON documents ((doc ->> 'email')) WHERE collection = 'user''s'"
        );
    }
}
