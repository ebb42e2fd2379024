pub mod aggregation;
pub mod db;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod validation;

pub use error::{ReadingError, StoreError};
pub use service::{NewReading, ReadingService, RetryPolicy};
pub use store::{DocumentStore, MemoryDocumentStore, Precondition, Versioned};
