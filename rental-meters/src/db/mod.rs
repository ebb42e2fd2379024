pub mod space_documents;

pub use space_documents::PgDocumentStore;
