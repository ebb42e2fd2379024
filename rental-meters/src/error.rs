use crate::validation::ValidationError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("version conflict (expected {expected:?}, found {actual:?})")]
    VersionConflict {
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("gave up after {attempts} conflicting writes")]
    Conflict { attempts: u32 },
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ReadingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ReadingError::NotFound(format!("space {id}")),
            other => ReadingError::Store(other),
        }
    }
}
