// storage/src/tokens.rs
use async_trait::async_trait;
use sled::transaction::ConflictableTransactionResult;
use sled::{Transactional, Tree};
use tracing::debug;

use clinic_models::{ClinicError, ClinicResult, TokenRecord, TokenScope};

use crate::store::{decode, encode, from_tx_error, Store};

#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Stores `record` under the digest of its plaintext.
    async fn insert(&self, hash: &[u8], record: &TokenRecord) -> ClinicResult<()>;
    /// `RecordNotFound` when no token has this digest.
    async fn get_by_hash(&self, hash: &[u8]) -> ClinicResult<TokenRecord>;
    /// Removes every token of `scope` issued to `email`. Returns how many went.
    async fn delete_all_for_principal(&self, scope: TokenScope, email: &str) -> ClinicResult<usize>;
}

/// Tokens keyed by digest, plus a `scope \0 email \0 digest` index so a
/// principal's tokens can be found without a full scan.
pub struct SledTokenStore {
    store: Store,
    tokens: Tree,
    principals: Tree,
}

impl SledTokenStore {
    pub fn new(store: Store) -> ClinicResult<Self> {
        let tokens = store.open_tree("tokens")?;
        let principals = store.open_tree("token_principals")?;
        Ok(Self {
            store,
            tokens,
            principals,
        })
    }
}

fn principal_prefix(scope: TokenScope, email: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.as_str().len() + email.len() + 2);
    key.extend_from_slice(scope.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(email.as_bytes());
    key.push(0);
    key
}

#[async_trait]
impl TokenStore for SledTokenStore {
    async fn insert(&self, hash: &[u8], record: &TokenRecord) -> ClinicResult<()> {
        let tokens = self.tokens.clone();
        let principals = self.principals.clone();
        let hash = hash.to_vec();
        let mut index = principal_prefix(record.scope, &record.email);
        index.extend_from_slice(&hash);
        let bytes = encode(record)?;

        self.store
            .run(move || {
                (&tokens, &principals)
                    .transaction(|(tokens, principals)| -> ConflictableTransactionResult<(), ClinicError> {
                        tokens.insert(hash.as_slice(), bytes.as_slice())?;
                        principals.insert(index.as_slice(), &b""[..])?;
                        Ok(())
                    })
                    .map_err(from_tx_error)
            })
            .await
    }

    async fn get_by_hash(&self, hash: &[u8]) -> ClinicResult<TokenRecord> {
        let tokens = self.tokens.clone();
        let hash = hash.to_vec();
        self.store
            .run(move || match tokens.get(&hash)? {
                Some(bytes) => decode(&bytes),
                None => Err(ClinicError::RecordNotFound),
            })
            .await
    }

    async fn delete_all_for_principal(&self, scope: TokenScope, email: &str) -> ClinicResult<usize> {
        let tokens = self.tokens.clone();
        let principals = self.principals.clone();
        let prefix = principal_prefix(scope, email);

        let removed = self
            .store
            .run(move || {
                let mut removed = 0;
                for item in principals.scan_prefix(&prefix) {
                    let (key, _) = item?;
                    let hash = &key[prefix.len()..];
                    if tokens.remove(hash)?.is_some() {
                        removed += 1;
                    }
                    principals.remove(&key)?;
                }
                Ok(removed)
            })
            .await?;

        debug!("revoked {} {} token(s) for {}", removed, scope, email);
        Ok(removed)
    }
}
