// storage/src/accounts.rs
use async_trait::async_trait;
use chrono::Utc;
use sled::transaction::{abort, ConflictableTransactionResult};
use sled::{Transactional, Tree};
use tracing::debug;

use clinic_models::{Account, ClinicError, ClinicResult};

use crate::store::{decode, encode, from_tx_error, id_key, Store};

#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Persists a new account and fills in its `id`, `created_at` and `version`.
    /// Fails with `DuplicateEmail` when any account already uses the email.
    async fn insert(&self, account: &mut Account) -> ClinicResult<()>;
    async fn get_by_email(&self, email: &str) -> ClinicResult<Account>;
    async fn get_by_id(&self, id: i64) -> ClinicResult<Account>;
    /// Writes the mutable fields back if the stored version still equals
    /// `account.version`, then bumps `account.version`.
    async fn update(&self, account: &mut Account) -> ClinicResult<()>;
}

/// Accounts keyed by id, plus an email → id index that both roles share.
pub struct SledAccountStore {
    store: Store,
    accounts: Tree,
    emails: Tree,
}

impl SledAccountStore {
    pub fn new(store: Store) -> ClinicResult<Self> {
        let accounts = store.open_tree("accounts")?;
        let emails = store.open_tree("account_emails")?;
        Ok(Self { store, accounts, emails })
    }
}

fn load(accounts: &Tree, key: &[u8]) -> ClinicResult<Account> {
    match accounts.get(key)? {
        Some(bytes) => decode(&bytes),
        None => Err(ClinicError::RecordNotFound),
    }
}

#[async_trait]
impl AccountStore for SledAccountStore {
    async fn insert(&self, account: &mut Account) -> ClinicResult<()> {
        let db = self.store.db().clone();
        let accounts = self.accounts.clone();
        let emails = self.emails.clone();
        let mut record = account.clone();
        record.password.clear_plaintext();

        let stored = self
            .store
            .run(move || {
                record.id = Store::next_id(&db)?;
                record.created_at = Utc::now();
                record.version = 1;
                let key = id_key(record.id);
                let bytes = encode(&record)?;

                (&accounts, &emails)
                    .transaction(|(accounts, emails)| -> ConflictableTransactionResult<(), ClinicError> {
                        if emails.get(record.email.as_bytes())?.is_some() {
                            return abort(ClinicError::DuplicateEmail);
                        }
                        emails.insert(record.email.as_bytes(), &key[..])?;
                        accounts.insert(&key[..], bytes.clone())?;
                        Ok(())
                    })
                    .map_err(from_tx_error)?;
                Ok(record)
            })
            .await?;

        debug!("inserted account {} ({})", stored.id, stored.role());
        account.id = stored.id;
        account.created_at = stored.created_at;
        account.version = stored.version;
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> ClinicResult<Account> {
        let accounts = self.accounts.clone();
        let emails = self.emails.clone();
        let email = email.to_string();
        self.store
            .run(move || {
                let key = emails
                    .get(email.as_bytes())?
                    .ok_or(ClinicError::RecordNotFound)?;
                load(&accounts, &key)
            })
            .await
    }

    async fn get_by_id(&self, id: i64) -> ClinicResult<Account> {
        if id < 1 {
            return Err(ClinicError::RecordNotFound);
        }
        let accounts = self.accounts.clone();
        self.store.run(move || load(&accounts, &id_key(id))).await
    }

    async fn update(&self, account: &mut Account) -> ClinicResult<()> {
        if account.id < 1 {
            return Err(ClinicError::RecordNotFound);
        }
        let accounts = self.accounts.clone();
        let emails = self.emails.clone();
        let mut record = account.clone();
        record.password.clear_plaintext();

        let version = self
            .store
            .run(move || {
                let key = id_key(record.id);
                (&accounts, &emails)
                    .transaction(|(accounts, emails)| -> ConflictableTransactionResult<i64, ClinicError> {
                        let current: Account = match accounts.get(&key[..])? {
                            Some(bytes) => decode(&bytes).or_else(abort)?,
                            None => return abort(ClinicError::RecordNotFound),
                        };
                        if current.version != record.version {
                            return abort(ClinicError::EditConflict);
                        }

                        if current.email != record.email {
                            if let Some(owner) = emails.get(record.email.as_bytes())? {
                                if owner.as_ref() != &key[..] {
                                    return abort(ClinicError::DuplicateEmail);
                                }
                            }
                            emails.remove(current.email.as_bytes())?;
                            emails.insert(record.email.as_bytes(), &key[..])?;
                        }

                        let mut next = record.clone();
                        next.created_at = current.created_at;
                        next.version = current.version + 1;
                        if !next.password.is_set() {
                            next.password = current.password.clone();
                        }
                        let bytes = encode(&next).or_else(abort)?;
                        accounts.insert(&key[..], bytes)?;
                        Ok(next.version)
                    })
                    .map_err(from_tx_error)
            })
            .await?;

        account.version = version;
        Ok(())
    }
}
