// storage/src/database.rs

use std::sync::Arc;

use tracing::info;

use clinic_models::ClinicResult;

use crate::accounts::{AccountStore, SledAccountStore};
use crate::patients::{PatientStore, SledPatientStore};
use crate::store::{StorageConfig, Store};
use crate::tokens::{SledTokenStore, TokenStore};

/// Every registry the service needs, opened over one sled database.
///
/// The stores are held behind trait objects so callers and tests can swap
/// any of them out.
#[derive(Clone)]
pub struct Database {
    store: Store,
    pub accounts: Arc<dyn AccountStore>,
    pub patients: Arc<dyn PatientStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Database {
    pub fn open(config: &StorageConfig) -> ClinicResult<Self> {
        let store = Store::open(config)?;
        let accounts = Arc::new(SledAccountStore::new(store.clone())?);
        let patients = Arc::new(SledPatientStore::new(store.clone())?);
        let tokens = Arc::new(SledTokenStore::new(store.clone())?);
        info!(
            "Storage ready (query timeout {:?}, temporary: {})",
            store.query_timeout(),
            config.temporary
        );
        Ok(Database {
            store,
            accounts,
            patients,
            tokens,
        })
    }

    pub async fn flush(&self) -> ClinicResult<()> {
        self.store.flush().await
    }
}
