pub mod cipher;
pub mod config;
pub mod db;
pub mod dirs;
pub mod error;
pub mod export;
pub mod import;
pub mod manifest;
pub mod models;
pub mod naming;
pub mod paths;
pub mod schema;
pub mod store;
pub mod sync;

pub use export::{ExportSummary, Exporter};
pub use import::{ImportSummary, Importer};
pub use naming::NamingConfig;
pub use paths::{DocumentPath, StorageRoots, Tree};
pub use store::{DocumentStore, PgDocumentStore};
pub use sync::{ReconcileOutcome, Synchronizer};
