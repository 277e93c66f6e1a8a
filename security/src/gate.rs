// security/src/gate.rs

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use clinic_models::{ClinicError, Principal, Role, TokenScope, Validator};

use crate::errors::{AuthError, AuthResult};
use crate::tokens::{validate_token_plaintext, TokenService};

/// Decides whether a request may proceed, given its `Authorization` header and
/// the roles the endpoint accepts.
#[derive(Clone)]
pub struct AuthorizationGate {
    tokens: TokenService,
}

impl AuthorizationGate {
    pub fn new(tokens: TokenService) -> Self {
        AuthorizationGate { tokens }
    }

    pub async fn authorize(&self, header: Option<&str>, accepted: &[Role]) -> AuthResult<Principal> {
        self.authorize_at(header, accepted, Utc::now()).await
    }

    /// Checks run in a fixed order: header shape, token syntax, lookup, role,
    /// expiry. Only a request that passes all of them gets a principal.
    pub async fn authorize_at(
        &self,
        header: Option<&str>,
        accepted: &[Role],
        now: DateTime<Utc>,
    ) -> AuthResult<Principal> {
        let plaintext = bearer_token(header).ok_or(AuthError::InvalidAuthenticationToken)?;

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        if !v.valid() {
            return Err(AuthError::ValidationFailed(v.into_errors()));
        }

        let record = match self.tokens.resolve(plaintext, TokenScope::Authentication).await {
            Ok(record) => record,
            Err(ClinicError::RecordNotFound) => return Err(AuthError::InvalidAuthenticationToken),
            Err(e) => return Err(AuthError::Store(e)),
        };

        if !accepted.contains(&record.role) {
            debug!("{} ({}) refused: role not accepted", record.email, record.role);
            return Err(AuthError::InvalidCredentials);
        }

        if record.is_expired(now) {
            warn!("expired token presented for {}, revoking", record.email);
            self.tokens
                .revoke_all_for_principal(record.scope, &record.email)
                .await?;
            return Err(AuthError::InvalidAuthenticationToken);
        }

        Ok(record.principal())
    }
}

/// The token segment of `Bearer <token>`. Anything else is malformed.
fn bearer_token(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tokens::{hash_plaintext, TOKEN_PLAINTEXT_LEN};
    use async_trait::async_trait;
    use chrono::Duration;
    use clinic_models::{ClinicResult, TokenRecord};
    use clinic_storage::TokenStore;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub Tokens {}

        #[async_trait]
        impl TokenStore for Tokens {
            async fn insert(&self, hash: &[u8], record: &TokenRecord) -> ClinicResult<()>;
            async fn get_by_hash(&self, hash: &[u8]) -> ClinicResult<TokenRecord>;
            async fn delete_all_for_principal(&self, scope: TokenScope, email: &str) -> ClinicResult<usize>;
        }
    }

    const PLAINTEXT: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    fn header() -> String {
        format!("Bearer {}", PLAINTEXT)
    }

    fn record(role: Role, expiry: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            email: "who@x.com".into(),
            role,
            scope: TokenScope::Authentication,
            expiry,
        }
    }

    fn gate(store: MockTokens) -> AuthorizationGate {
        AuthorizationGate::new(TokenService::new(Arc::new(store), Duration::hours(72)))
    }

    fn returning(rec: TokenRecord) -> MockTokens {
        let mut store = MockTokens::new();
        let expected = hash_plaintext(PLAINTEXT);
        store
            .expect_get_by_hash()
            .returning(move |hash| {
                assert_eq!(hash, expected.as_slice());
                Ok(rec.clone())
            });
        store
    }

    #[test]
    fn should_parse_bearer_header() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("bearer abc")), None);
        assert_eq!(bearer_token(Some("Bearer")), None);
        assert_eq!(bearer_token(Some("Bearer a b")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[tokio::test]
    async fn should_reject_malformed_header_before_lookup() {
        let g = gate(MockTokens::new());
        let err = g.authorize(Some(PLAINTEXT), &[Role::Doctor]).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthenticationToken));
        let err = g.authorize(None, &[Role::Doctor]).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthenticationToken));
    }

    #[tokio::test]
    async fn should_flag_wrong_length_as_validation_failure() {
        let g = gate(MockTokens::new());
        let err = g.authorize(Some("Bearer short"), &[Role::Doctor]).await.unwrap_err();
        match err {
            AuthError::ValidationFailed(errors) => assert_eq!(errors["token"], "must be 26 bytes long"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn should_treat_unknown_token_as_unauthenticated() {
        let mut store = MockTokens::new();
        store
            .expect_get_by_hash()
            .returning(|_| Err(ClinicError::RecordNotFound));
        let err = gate(store).authorize(Some(&header()), &[Role::Doctor]).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthenticationToken));
    }

    #[tokio::test]
    async fn should_surface_storage_faults() {
        let mut store = MockTokens::new();
        store
            .expect_get_by_hash()
            .returning(|_| Err(ClinicError::Timeout(std::time::Duration::from_secs(3))));
        let err = gate(store).authorize(Some(&header()), &[Role::Doctor]).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(ClinicError::Timeout(_))));
    }

    #[tokio::test]
    async fn should_refuse_role_outside_accepted_set() {
        let store = returning(record(Role::Doctor, Utc::now() + Duration::hours(1)));
        let err = gate(store)
            .authorize(Some(&header()), &[Role::Receptionist])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn should_admit_valid_token() {
        let store = returning(record(Role::Receptionist, Utc::now() + Duration::hours(1)));
        let principal = gate(store)
            .authorize(Some(&header()), &[Role::Receptionist, Role::Doctor])
            .await
            .unwrap();
        assert_eq!(principal.email, "who@x.com");
        assert_eq!(principal.role, Role::Receptionist);
    }

    #[tokio::test]
    async fn should_revoke_and_reject_expired_token() {
        let now = Utc::now();
        let mut store = returning(record(Role::Doctor, now));
        store
            .expect_delete_all_for_principal()
            .with(eq(TokenScope::Authentication), eq("who@x.com"))
            .times(1)
            .returning(|_, _| Ok(2));
        let err = gate(store)
            .authorize_at(Some(&header()), &[Role::Doctor], now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthenticationToken));
    }

    #[tokio::test]
    async fn should_fail_internally_when_revoke_fails() {
        let now = Utc::now();
        let mut store = returning(record(Role::Doctor, now - Duration::minutes(1)));
        store
            .expect_delete_all_for_principal()
            .times(1)
            .returning(|_, _| Err(ClinicError::DatabaseError("disk gone".into())));
        let err = gate(store)
            .authorize_at(Some(&header()), &[Role::Doctor], now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Store(ClinicError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn should_check_role_before_expiry() {
        let now = Utc::now();
        let store = returning(record(Role::Doctor, now - Duration::hours(1)));
        let err = gate(store)
            .authorize_at(Some(&header()), &[Role::Receptionist], now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn should_use_plaintext_of_expected_length() {
        assert_eq!(PLAINTEXT.len(), TOKEN_PLAINTEXT_LEN);
    }
}
