//! Postgres-backed family store.
//!
//! One JSONB document per family, keyed by family id, with the parent and
//! child ids denormalized into `TEXT[]` columns for membership lookups.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database | `23xxx` (integrity) | `ValidationFailure` |
//! | Database | `40001`, `40P01` (serialization, deadlock) | `Transient` |
//! | Database | `57P01`..`57P03`, `08xxx` (shutdown, connection) | `Transient` |
//! | Database | other | `Permanent` |
//! | Io, Tls, PoolTimedOut, PoolClosed, WorkerCrashed | N/A | `Transient` |
//! | RowNotFound | N/A | `NotFound` |
//! | Decode, ColumnDecode, other | N/A | `Permanent` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use kinship_core::{AggregateRoot, Entity, FamilyId, PersonId};
use kinship_family::Family;

use super::record::FamilyRecord;
use super::r#trait::{FamilyStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS families (
    id          TEXT PRIMARY KEY,
    status      TEXT NOT NULL,
    parent_ids  TEXT[] NOT NULL,
    child_ids   TEXT[] NOT NULL,
    document    JSONB NOT NULL,
    version     BIGINT NOT NULL CHECK (version >= 0),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS families_parent_ids_idx ON families USING GIN (parent_ids);
CREATE INDEX IF NOT EXISTS families_child_ids_idx ON families USING GIN (child_ids);
"#;

#[derive(Debug, Clone)]
pub struct PostgresFamilyStore {
    pool: Arc<PgPool>,
}

impl PostgresFamilyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_documents(
        &self,
        operation: &str,
        sql: &str,
        key: Option<&str>,
    ) -> Result<Vec<Family>, StoreError> {
        let mut query = sqlx::query(sql);
        if let Some(key) = key {
            query = query.bind(key.to_string());
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<Family, StoreError> {
    let Json(record): Json<FamilyRecord> = row
        .try_get("document")
        .map_err(|e| map_sqlx_error("decode_document", e))?;
    record.into_family()
}

#[async_trait]
impl FamilyStore for PostgresFamilyStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self), fields(family_id = %id), err)]
    async fn load(&self, id: &FamilyId) -> Result<Family, StoreError> {
        let row = sqlx::query("SELECT document FROM families WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load", e))?;

        match row {
            Some(row) => decode_row(&row),
            None => Err(StoreError::family_not_found(id)),
        }
    }

    #[instrument(skip_all, fields(family_id = %family.id(), version = family.version()), err)]
    async fn store(&self, family: &Family) -> Result<(), StoreError> {
        let record = FamilyRecord::from_family(family);
        let parent_ids: Vec<String> = family.parents().iter().map(|p| p.id().to_string()).collect();
        let child_ids: Vec<String> = family.children().iter().map(|c| c.id().to_string()).collect();
        let version = i64::try_from(record.version)
            .map_err(|_| StoreError::ValidationFailure(format!("version {} out of range", record.version)))?;

        sqlx::query(
            r#"
            INSERT INTO families (id, status, parent_ids, child_ids, document, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                parent_ids = EXCLUDED.parent_ids,
                child_ids = EXCLUDED.child_ids,
                document = EXCLUDED.document,
                version = EXCLUDED.version,
                updated_at = now()
            "#,
        )
        .bind(family.id().as_str())
        .bind(family.status().as_str())
        .bind(&parent_ids)
        .bind(&child_ids)
        .bind(Json(&record))
        .bind(version)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("store", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(parent_id = %parent_id), err)]
    async fn load_by_parent(&self, parent_id: &PersonId) -> Result<Vec<Family>, StoreError> {
        self.fetch_documents(
            "load_by_parent",
            "SELECT document FROM families WHERE $1 = ANY(parent_ids) ORDER BY id",
            Some(parent_id.as_str()),
        )
        .await
    }

    #[instrument(skip(self), fields(child_id = %child_id), err)]
    async fn load_by_child(&self, child_id: &PersonId) -> Result<Family, StoreError> {
        self.fetch_documents(
            "load_by_child",
            "SELECT document FROM families WHERE $1 = ANY(child_ids) ORDER BY id LIMIT 1",
            Some(child_id.as_str()),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound(format!("family with child {child_id}")))
    }

    #[instrument(skip(self), err)]
    async fn load_all(&self) -> Result<Vec<Family>, StoreError> {
        self.fetch_documents("load_all", "SELECT document FROM families ORDER BY id", None)
            .await
    }
}

/// Translate a sqlx error into the store taxonomy.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some(code) if is_transient_code(code) => StoreError::Transient(msg),
                Some(code) if code.starts_with("23") => StoreError::ValidationFailure(msg),
                _ => StoreError::Permanent(msg),
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            StoreError::Transient(format!("connection failure in {}: {}", operation, err))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("no row in {}", operation)),
        _ => StoreError::Permanent(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_transient_code(code: &str) -> bool {
    matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03") || code.starts_with("08")
}
