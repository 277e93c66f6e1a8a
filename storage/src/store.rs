// storage/src/store.rs
//! The shared sled handle and the plumbing every registry uses: blocking calls
//! bounded by the query timeout, record encoding, id keys.

use std::path::PathBuf;
use std::time::Duration;

use bincode::{
    config::{self, BigEndian, Configuration, Fixint},
    serde::{decode_from_slice, encode_to_vec},
};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::TransactionError;
use sled::{Db, Tree};
use tokio::time::timeout;
use tracing::{info, warn};

use clinic_models::{ClinicError, ClinicResult};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Throw the database away when the last handle drops. Used by tests.
    pub temporary: bool,
    pub query_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: PathBuf::from("./data/clinic"),
            temporary: false,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl StorageConfig {
    pub fn temporary() -> Self {
        StorageConfig {
            temporary: true,
            ..StorageConfig::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    db: Db,
    query_timeout: Duration,
}

impl Store {
    pub fn open(config: &StorageConfig) -> ClinicResult<Self> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()?
        } else {
            info!("Opening sled database at {:?}", config.path);
            sled::Config::new().path(&config.path).open()?
        };
        Ok(Store {
            db,
            query_timeout: config.query_timeout,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn open_tree(&self, name: &str) -> ClinicResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    /// Next record id. sled ids start at 0; record ids start at 1.
    pub(crate) fn next_id(db: &Db) -> ClinicResult<i64> {
        let raw = db.generate_id()?;
        i64::try_from(raw + 1).map_err(|_| ClinicError::InternalError("id space exhausted".to_string()))
    }

    /// Runs `op` on the blocking pool and gives up after the query timeout.
    ///
    /// A timed-out operation may still complete in the background; the caller
    /// only learns that it did not finish in time.
    pub(crate) async fn run<T, F>(&self, op: F) -> ClinicResult<T>
    where
        F: FnOnce() -> ClinicResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(op);
        match timeout(self.query_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ClinicError::InternalError(format!(
                "storage task failed: {}",
                join_err
            ))),
            Err(_) => {
                warn!("storage call exceeded {:?}", self.query_timeout);
                Err(ClinicError::Timeout(self.query_timeout))
            }
        }
    }

    pub async fn flush(&self) -> ClinicResult<()> {
        let db = self.db.clone();
        self.run(move || {
            db.flush()?;
            Ok(())
        })
        .await
    }
}

fn bincode_config() -> Configuration<BigEndian, Fixint> {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> ClinicResult<Vec<u8>> {
    Ok(encode_to_vec(value, bincode_config())?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ClinicResult<T> {
    let (value, _) = decode_from_slice(bytes, bincode_config())?;
    Ok(value)
}

/// Big-endian so that tree order matches id order.
pub(crate) fn id_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn from_tx_error(err: TransactionError<ClinicError>) -> ClinicError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}
