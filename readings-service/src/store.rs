use rental_meters::{
    db::PgDocumentStore, domain::SpaceDocument, DocumentStore, MemoryDocumentStore, Precondition,
    StoreError, Versioned,
};
use sqlx::postgres::PgPoolOptions;

use crate::config::{StoreConfig, StoreKind};

/// The store backend selected by configuration.
pub enum SpaceStore {
    Memory(MemoryDocumentStore),
    Postgres(PgDocumentStore),
}

impl SpaceStore {
    pub async fn connect(cfg: &StoreConfig) -> anyhow::Result<Self> {
        match cfg.kind {
            StoreKind::Memory => {
                tracing::warn!("using in-memory space store; data is lost on restart");
                Ok(Self::Memory(MemoryDocumentStore::new()))
            }
            StoreKind::Postgres => {
                let uri = cfg
                    .uri
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("store.uri is required for postgres"))?;
                let pool = PgPoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect(uri)
                    .await?;
                Ok(Self::Postgres(PgDocumentStore::new(pool)))
            }
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for SpaceStore {
    async fn get_document(&self, id: &str) -> Result<Versioned<SpaceDocument>, StoreError> {
        match self {
            Self::Memory(s) => s.get_document(id).await,
            Self::Postgres(s) => s.get_document(id).await,
        }
    }

    async fn put_document(
        &self,
        id: &str,
        document: SpaceDocument,
        precondition: Precondition,
    ) -> Result<Versioned<SpaceDocument>, StoreError> {
        match self {
            Self::Memory(s) => s.put_document(id, document, precondition).await,
            Self::Postgres(s) => s.put_document(id, document, precondition).await,
        }
    }
}
