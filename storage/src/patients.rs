// storage/src/patients.rs
use async_trait::async_trait;
use chrono::Utc;
use sled::transaction::{abort, ConflictableTransactionResult};
use sled::Tree;
use tracing::debug;

use clinic_models::{ClinicError, ClinicResult, Patient};

use crate::store::{decode, encode, from_tx_error, id_key, Store};

#[async_trait]
pub trait PatientStore: Send + Sync + 'static {
    /// Persists a new patient and fills in its `id`, `created_at` and `version`.
    async fn insert(&self, patient: &mut Patient) -> ClinicResult<()>;
    async fn get_by_id(&self, id: i64) -> ClinicResult<Patient>;
    /// All patients in id order, optionally only those assigned to one doctor.
    async fn list(&self, doctor_id: Option<i64>) -> ClinicResult<Vec<Patient>>;
    /// Conditional write: succeeds only if the stored version still equals
    /// `patient.version`. A stale version yields `EditConflict`, a missing
    /// record `RecordNotFound`.
    async fn update(&self, patient: &mut Patient) -> ClinicResult<()>;
    /// `id < 1` and an absent record both yield `RecordNotFound`.
    async fn delete(&self, id: i64) -> ClinicResult<()>;
}

pub struct SledPatientStore {
    store: Store,
    patients: Tree,
}

impl SledPatientStore {
    pub fn new(store: Store) -> ClinicResult<Self> {
        let patients = store.open_tree("patients")?;
        Ok(Self { store, patients })
    }
}

#[async_trait]
impl PatientStore for SledPatientStore {
    async fn insert(&self, patient: &mut Patient) -> ClinicResult<()> {
        let db = self.store.db().clone();
        let patients = self.patients.clone();
        let mut record = patient.clone();

        let stored = self
            .store
            .run(move || {
                record.id = Store::next_id(&db)?;
                record.created_at = Utc::now();
                record.version = 1;
                patients.insert(id_key(record.id), encode(&record)?)?;
                Ok(record)
            })
            .await?;

        debug!("inserted patient {}", stored.id);
        patient.id = stored.id;
        patient.created_at = stored.created_at;
        patient.version = stored.version;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> ClinicResult<Patient> {
        if id < 1 {
            return Err(ClinicError::RecordNotFound);
        }
        let patients = self.patients.clone();
        self.store
            .run(move || match patients.get(id_key(id))? {
                Some(bytes) => decode(&bytes),
                None => Err(ClinicError::RecordNotFound),
            })
            .await
    }

    async fn list(&self, doctor_id: Option<i64>) -> ClinicResult<Vec<Patient>> {
        let patients = self.patients.clone();
        self.store
            .run(move || {
                let mut out = Vec::new();
                for item in patients.iter() {
                    let (_key, bytes) = item?;
                    let patient: Patient = decode(&bytes)?;
                    if doctor_id.map_or(true, |d| patient.doctor_id == d) {
                        out.push(patient);
                    }
                }
                Ok(out)
            })
            .await
    }

    async fn update(&self, patient: &mut Patient) -> ClinicResult<()> {
        if patient.id < 1 {
            return Err(ClinicError::RecordNotFound);
        }
        let patients = self.patients.clone();
        let record = patient.clone();

        let version = self
            .store
            .run(move || {
                let key = id_key(record.id);
                patients
                    .transaction(|tx| -> ConflictableTransactionResult<i64, ClinicError> {
                        let current: Patient = match tx.get(key)? {
                            Some(bytes) => decode(&bytes).or_else(abort)?,
                            None => return abort(ClinicError::RecordNotFound),
                        };
                        if current.version != record.version {
                            return abort(ClinicError::EditConflict);
                        }
                        let mut next = record.clone();
                        next.created_at = current.created_at;
                        next.version = current.version + 1;
                        tx.insert(&key[..], encode(&next).or_else(abort)?)?;
                        Ok(next.version)
                    })
                    .map_err(from_tx_error)
            })
            .await?;

        debug!("updated patient {} to version {}", patient.id, version);
        patient.version = version;
        Ok(())
    }

    async fn delete(&self, id: i64) -> ClinicResult<()> {
        if id < 1 {
            return Err(ClinicError::RecordNotFound);
        }
        let patients = self.patients.clone();
        self.store
            .run(move || match patients.remove(id_key(id))? {
                Some(_) => Ok(()),
                None => Err(ClinicError::RecordNotFound),
            })
            .await
    }
}
