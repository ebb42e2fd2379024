pub mod api;
pub mod config;
pub mod import;
pub mod metrics_server;
pub mod observability;
pub mod store;

pub use api::router;
pub use store::SpaceStore;
