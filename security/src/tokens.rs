// security/src/tokens.rs
//! Opaque bearer tokens. The caller gets the plaintext once; only its SHA-256
//! digest is stored and every lookup goes through the digest.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use clinic_models::{ClinicError, ClinicResult, Role, TokenRecord, TokenScope, Validator};
use clinic_storage::TokenStore;

pub const TOKEN_ENTROPY_BYTES: usize = 16;
/// Length of the base32 rendering of `TOKEN_ENTROPY_BYTES` random bytes.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    pub email: String,
    pub role: Role,
    pub expiry: DateTime<Utc>,
    #[serde(skip, default = "default_scope")]
    pub scope: TokenScope,
}

fn default_scope() -> TokenScope {
    TokenScope::Authentication
}

impl Token {
    pub fn record(&self) -> TokenRecord {
        TokenRecord {
            email: self.email.clone(),
            role: self.role,
            scope: self.scope,
            expiry: self.expiry,
        }
    }
}

pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Mints a token without storing it.
pub fn generate_token(email: &str, role: Role, ttl: Duration, scope: TokenScope) -> ClinicResult<Token> {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ClinicError::TokenGenerationError(e.to_string()))?;

    let plaintext = BASE32_NOPAD.encode(&bytes);
    let hash = hash_plaintext(&plaintext);
    Ok(Token {
        plaintext,
        hash,
        email: email.to_string(),
        role,
        expiry: Utc::now() + ttl,
        scope,
    })
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == TOKEN_PLAINTEXT_LEN, "token", "must be 26 bytes long");
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>, ttl: Duration) -> Self {
        TokenService { store, ttl }
    }

    /// Generates and stores a token for `email`, valid for `ttl`.
    pub async fn issue(&self, email: &str, role: Role, ttl: Duration, scope: TokenScope) -> ClinicResult<Token> {
        let token = generate_token(email, role, ttl, scope)?;
        self.store.insert(&token.hash, &token.record()).await?;
        info!("issued {} token for {} ({})", scope, email, role);
        Ok(token)
    }

    /// An authentication token with the configured lifetime.
    pub async fn issue_authentication(&self, email: &str, role: Role) -> ClinicResult<Token> {
        self.issue(email, role, self.ttl, TokenScope::Authentication).await
    }

    /// Looks a plaintext up by digest. A token minted for another scope is
    /// reported as `RecordNotFound`. Expiry is left to the caller.
    pub async fn resolve(&self, plaintext: &str, expected: TokenScope) -> ClinicResult<TokenRecord> {
        let record = self.store.get_by_hash(&hash_plaintext(plaintext)).await?;
        if record.scope != expected {
            return Err(ClinicError::RecordNotFound);
        }
        Ok(record)
    }

    pub async fn revoke_all_for_principal(&self, scope: TokenScope, email: &str) -> ClinicResult<usize> {
        let removed = self.store.delete_all_for_principal(scope, email).await?;
        info!("revoked {} {} token(s) for {}", removed, scope, email);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_storage::{SledTokenStore, StorageConfig, Store};

    fn service() -> TokenService {
        let store = Store::open(&StorageConfig::temporary()).unwrap();
        let tokens = SledTokenStore::new(store).unwrap();
        TokenService::new(Arc::new(tokens), Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    #[test]
    fn should_generate_distinct_tokens_of_fixed_length() {
        let a = generate_token("a@x.com", Role::Doctor, Duration::hours(1), TokenScope::Authentication).unwrap();
        let b = generate_token("a@x.com", Role::Doctor, Duration::hours(1), TokenScope::Authentication).unwrap();
        assert_eq!(a.plaintext.len(), TOKEN_PLAINTEXT_LEN);
        assert_ne!(a.plaintext, b.plaintext);
        assert_eq!(a.hash, hash_plaintext(&a.plaintext));
        assert_eq!(a.hash.len(), 32);
    }

    #[test]
    fn should_hide_hash_and_scope_when_serialized() {
        let t = generate_token("a@x.com", Role::Receptionist, Duration::hours(1), TokenScope::Authentication).unwrap();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["token"], t.plaintext.as_str());
        assert_eq!(json["role"], "receptionist");
        assert!(json.get("hash").is_none());
        assert!(json.get("scope").is_none());
    }

    #[test]
    fn should_validate_plaintext_length() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "short");
        assert_eq!(v.errors()["token"], "must be 26 bytes long");

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "");
        assert_eq!(v.errors()["token"], "must be provided");

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, &"A".repeat(TOKEN_PLAINTEXT_LEN));
        assert!(v.valid());
    }

    #[tokio::test]
    async fn should_resolve_freshly_issued_token() {
        let svc = service();
        let token = svc.issue_authentication("d@x.com", Role::Doctor).await.unwrap();
        let record = svc.resolve(&token.plaintext, TokenScope::Authentication).await.unwrap();
        assert_eq!(record.principal().email, "d@x.com");
        assert_eq!(record.role, Role::Doctor);
        assert!(!record.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn should_not_authenticate_with_other_scope() {
        let svc = service();
        let token = svc
            .issue("d@x.com", Role::Doctor, Duration::hours(1), TokenScope::Activation)
            .await
            .unwrap();
        let err = svc.resolve(&token.plaintext, TokenScope::Authentication).await.unwrap_err();
        assert!(matches!(err, ClinicError::RecordNotFound));
    }

    #[tokio::test]
    async fn should_report_expired_record_until_revoked() {
        let svc = service();
        let token = svc
            .issue("old@x.com", Role::Receptionist, Duration::seconds(-5), TokenScope::Authentication)
            .await
            .unwrap();
        let record = svc.resolve(&token.plaintext, TokenScope::Authentication).await.unwrap();
        assert!(record.is_expired(Utc::now()));

        assert_eq!(svc.revoke_all_for_principal(TokenScope::Authentication, "old@x.com").await.unwrap(), 1);
        let err = svc.resolve(&token.plaintext, TokenScope::Authentication).await.unwrap_err();
        assert!(matches!(err, ClinicError::RecordNotFound));
    }

    #[tokio::test]
    async fn should_miss_unknown_plaintext() {
        let svc = service();
        let err = svc.resolve(&"B".repeat(TOKEN_PLAINTEXT_LEN), TokenScope::Authentication).await.unwrap_err();
        assert!(matches!(err, ClinicError::RecordNotFound));
    }
}
