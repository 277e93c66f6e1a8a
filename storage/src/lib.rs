// storage/src/lib.rs

pub mod accounts;
pub mod database;
pub mod patients;
pub mod store;
pub mod tokens;

pub use accounts::{AccountStore, SledAccountStore};
pub use database::Database;
pub use patients::{PatientStore, SledPatientStore};
pub use store::{StorageConfig, Store, DEFAULT_QUERY_TIMEOUT};
pub use tokens::{SledTokenStore, TokenStore};
