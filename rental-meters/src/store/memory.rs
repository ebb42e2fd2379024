use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use super::{DocumentStore, Precondition, Versioned};
use crate::{domain::SpaceDocument, error::StoreError};

/// Process-local store; the write lock makes check-and-replace atomic.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Versioned<SpaceDocument>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, id: &str) -> Result<Versioned<SpaceDocument>, StoreError> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn put_document(
        &self,
        id: &str,
        document: SpaceDocument,
        precondition: Precondition,
    ) -> Result<Versioned<SpaceDocument>, StoreError> {
        let mut documents = self.documents.write().await;
        let current = documents.get(id).map(|v| v.version);
        precondition.check(id, current)?;

        let stored = Versioned {
            version: current.unwrap_or(0) + 1,
            document,
        };
        documents.insert(id.to_string(), stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MeterReadings, SpaceLayout, UtilityPrices};

    fn apartment(id: &str, name: &str) -> SpaceDocument {
        SpaceDocument {
            id: id.to_string(),
            name: name.to_string(),
            address: None,
            prices: UtilityPrices::default(),
            layout: SpaceLayout::Apartment {
                meter_readings: MeterReadings::default(),
            },
        }
    }

    #[tokio::test]
    async fn versions_start_at_one_and_increment() {
        let store = MemoryDocumentStore::new();

        let created = store
            .put_document("apt-1", apartment("apt-1", "A"), Precondition::Absent)
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let updated = store
            .put_document("apt-1", apartment("apt-1", "B"), Precondition::Version(1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let loaded = store.get_document("apt-1").await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.document.name, "B");
    }

    #[tokio::test]
    async fn stale_write_is_rejected_and_leaves_document_untouched() {
        let store = MemoryDocumentStore::new();
        store
            .put_document("apt-1", apartment("apt-1", "A"), Precondition::Any)
            .await
            .unwrap();
        store
            .put_document("apt-1", apartment("apt-1", "B"), Precondition::Version(1))
            .await
            .unwrap();

        let stale = store
            .put_document("apt-1", apartment("apt-1", "C"), Precondition::Version(1))
            .await;
        assert_eq!(
            stale,
            Err(StoreError::VersionConflict {
                expected: Some(1),
                actual: Some(2)
            })
        );
        assert_eq!(store.get_document("apt-1").await.unwrap().document.name, "B");
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        assert_eq!(
            store.get_document("nope").await,
            Err(StoreError::NotFound("nope".to_string()))
        );
        assert!(store.is_empty().await);
    }
}
