pub mod memory;

use serde::Serialize;

use crate::{domain::SpaceDocument, error::StoreError};

pub use memory::MemoryDocumentStore;

/// A document together with the version it was read or written at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub document: T,
}

/// Guard on a whole-document write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Overwrite whatever is stored, or create.
    Any,
    /// Create only; fail if the id is taken.
    Absent,
    /// Replace only if the stored version still matches.
    Version(u64),
}

impl Precondition {
    /// Evaluates the guard against the currently stored version.
    pub fn check(&self, id: &str, current: Option<u64>) -> Result<(), StoreError> {
        match (*self, current) {
            (Precondition::Any, _) | (Precondition::Absent, None) => Ok(()),
            (Precondition::Absent, Some(actual)) => Err(StoreError::VersionConflict {
                expected: None,
                actual: Some(actual),
            }),
            (Precondition::Version(_), None) => Err(StoreError::NotFound(id.to_string())),
            (Precondition::Version(expected), Some(actual)) if expected == actual => Ok(()),
            (Precondition::Version(expected), Some(actual)) => Err(StoreError::VersionConflict {
                expected: Some(expected),
                actual: Some(actual),
            }),
        }
    }
}

/// Persistence port for space documents.
///
/// Writes replace the whole document; callers merge. Every successful write
/// bumps the version, starting from 1 on creation.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Versioned<SpaceDocument>, StoreError>;

    async fn put_document(
        &self,
        id: &str,
        document: SpaceDocument,
        precondition: Precondition,
    ) -> Result<Versioned<SpaceDocument>, StoreError>;
}
