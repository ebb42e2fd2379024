use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    domain::SpaceDocument,
    error::StoreError,
    store::{DocumentStore, Precondition, Versioned},
};

#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    version: i64,
    body: String,
}

impl DocumentRow {
    fn decode(self) -> Result<Versioned<SpaceDocument>, StoreError> {
        Ok(Versioned {
            version: self.version as u64,
            document: serde_json::from_str(&self.body)?,
        })
    }
}

/// Postgres-backed document store.
///
/// Documents are kept as JSON text in `space_documents` (see
/// `sql/schema/01_space_documents.sql`); versioned writes are a single
/// conditional `UPDATE`, so two writers holding the same version cannot both
/// succeed.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, id: &str) -> Result<Option<u64>, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar::<_, i64>("SELECT version FROM space_documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map(|v| v as u64))
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_document(&self, id: &str) -> Result<Versioned<SpaceDocument>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT version, body
            FROM space_documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .decode()
    }

    async fn put_document(
        &self,
        id: &str,
        document: SpaceDocument,
        precondition: Precondition,
    ) -> Result<Versioned<SpaceDocument>, StoreError> {
        let body = serde_json::to_string(&document)?;
        let now = OffsetDateTime::now_utc();

        let written: Option<i64> = match precondition {
            Precondition::Any => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO space_documents (id, version, body, updated_at)
                    VALUES ($1, 1, $2, $3)
                    ON CONFLICT (id) DO UPDATE
                    SET version = space_documents.version + 1,
                        body = EXCLUDED.body,
                        updated_at = EXCLUDED.updated_at
                    RETURNING version
                    "#,
                )
                .bind(id)
                .bind(&body)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            Precondition::Absent => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO space_documents (id, version, body, updated_at)
                    VALUES ($1, 1, $2, $3)
                    ON CONFLICT (id) DO NOTHING
                    RETURNING version
                    "#,
                )
                .bind(id)
                .bind(&body)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            Precondition::Version(expected) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    UPDATE space_documents
                    SET version = version + 1,
                        body = $3,
                        updated_at = $4
                    WHERE id = $1
                      AND version = $2
                    RETURNING version
                    "#,
                )
                .bind(id)
                .bind(expected as i64)
                .bind(&body)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match written {
            Some(version) => Ok(Versioned {
                version: version as u64,
                document,
            }),
            None => {
                // Lost the race or the guard never held; report what is there now.
                let current = self.current_version(id).await?;
                precondition.check(id, current)?;
                Err(StoreError::VersionConflict {
                    expected: match precondition {
                        Precondition::Version(v) => Some(v),
                        _ => None,
                    },
                    actual: current,
                })
            }
        }
    }
}
