// security/src/accounts.rs
// Registration, login and profile changes for both staff roles. One flow
// serves doctors and receptionists; the role only picks the profile shape.

use std::sync::Arc;

use chrono::NaiveTime;
use serde::Deserialize;
use tracing::info;

use clinic_models::medical::account::{validate_email, validate_plaintext_password};
use clinic_models::medical::{parse_shift_time, validate_account};
use clinic_models::{Account, ClinicError, Password, Principal, Profile, Role, TokenScope, Validator};
use clinic_storage::AccountStore;

use crate::errors::{AuthError, AuthResult};
use crate::tokens::{Token, TokenService};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub specialization: Option<String>,
    pub contact: Option<i64>,
    #[serde(default)]
    pub shift_start: String,
    #[serde(default)]
    pub shift_end: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub specialization: Option<String>,
    pub contact: Option<i64>,
    pub shift_start: Option<String>,
    pub shift_end: Option<String>,
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    tokens: TokenService,
    password_cost: u32,
}

fn shift(field: &str, value: &str) -> AuthResult<NaiveTime> {
    parse_shift_time(value)
        .map_err(|e| AuthError::BadRequest(format!("{} {:?} is not a valid time: {}", field, value, e)))
}

/// bcrypt is slow on purpose; keep it off the async workers.
async fn hash_password(plaintext: String, cost: u32) -> AuthResult<Password> {
    let password = tokio::task::spawn_blocking(move || {
        let mut password = Password::default();
        password.set_with_cost(&plaintext, cost).map(|_| password)
    })
    .await
    .map_err(|e| ClinicError::InternalError(format!("password hashing task failed: {}", e)))??;
    Ok(password)
}

fn check(account: &Account) -> AuthResult<()> {
    let mut v = Validator::new();
    validate_account(&mut v, account);
    if v.valid() {
        Ok(())
    } else {
        Err(AuthError::ValidationFailed(v.into_errors()))
    }
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountStore>, tokens: TokenService, password_cost: u32) -> Self {
        AccountService {
            accounts,
            tokens,
            password_cost,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Creates the account and hands back its first authentication token.
    pub async fn register(&self, role: Role, input: Registration) -> AuthResult<(Account, Token)> {
        let start = shift("shift_start", &input.shift_start)?;
        let end = shift("shift_end", &input.shift_end)?;

        let profile = match role {
            Role::Doctor => Profile::Doctor {
                specialization: input.specialization.unwrap_or_default(),
                contact: input.contact.unwrap_or_default(),
            },
            Role::Receptionist => Profile::Receptionist,
        };

        let mut account = Account::new(input.name, input.email, start, end, profile);
        account.password = hash_password(input.password, self.password_cost).await?;
        check(&account)?;

        match self.accounts.insert(&mut account).await {
            Ok(()) => {}
            Err(ClinicError::DuplicateEmail) => {
                return Err(AuthError::validation("email", "a user with this email address exists"))
            }
            Err(e) => return Err(e.into()),
        }
        account.password.clear_plaintext();
        info!("registered {} account {}", role, account.id);

        let token = self.tokens.issue_authentication(&account.email, role).await?;
        Ok((account, token))
    }

    /// Exchanges an email and password for a fresh authentication token.
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Token> {
        let mut v = Validator::new();
        validate_email(&mut v, email);
        validate_plaintext_password(&mut v, password);
        if !v.valid() {
            return Err(AuthError::ValidationFailed(v.into_errors()));
        }

        let account = match self.accounts.get_by_email(email).await {
            Ok(account) => account,
            Err(ClinicError::RecordNotFound) => return Err(AuthError::LoginFailed),
            Err(e) => return Err(e.into()),
        };

        let stored = account.password.clone();
        let candidate = password.to_string();
        let ok = tokio::task::spawn_blocking(move || stored.matches(&candidate))
            .await
            .map_err(|e| ClinicError::InternalError(format!("password check task failed: {}", e)))??;
        if !ok {
            return Err(AuthError::LoginFailed);
        }

        Ok(self.tokens.issue_authentication(&account.email, account.role()).await?)
    }

    pub async fn profile(&self, principal: &Principal) -> AuthResult<Account> {
        match self.accounts.get_by_email(&principal.email).await {
            Ok(account) => Ok(account),
            // The token outlived its account's email.
            Err(ClinicError::RecordNotFound) => Err(AuthError::InvalidAuthenticationToken),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies the supplied fields to the caller's own account.
    ///
    /// Changing the email revokes every authentication token issued under the
    /// old one, so the caller has to log in again.
    pub async fn update_profile(&self, principal: &Principal, update: ProfileUpdate) -> AuthResult<Account> {
        let mut account = self.profile(principal).await?;
        let old_email = account.email.clone();

        if let Some(name) = update.name {
            account.name = name;
        }
        if let Some(email) = update.email {
            account.email = email;
        }
        if let Some(value) = update.shift_start.as_deref() {
            account.shift_start = shift("shift_start", value)?;
        }
        if let Some(value) = update.shift_end.as_deref() {
            account.shift_end = shift("shift_end", value)?;
        }

        let mut v = Validator::new();
        match &mut account.profile {
            Profile::Doctor { specialization, contact } => {
                if let Some(s) = update.specialization {
                    *specialization = s;
                }
                if let Some(c) = update.contact {
                    *contact = c;
                }
            }
            Profile::Receptionist => {
                v.check(update.specialization.is_none(), "specialization", "only doctors have a specialization");
                v.check(update.contact.is_none(), "contact", "only doctors have a contact number");
            }
        }
        if !v.valid() {
            return Err(AuthError::ValidationFailed(v.into_errors()));
        }

        if let Some(plaintext) = update.password {
            account.password = hash_password(plaintext, self.password_cost).await?;
        }
        check(&account)?;

        match self.accounts.update(&mut account).await {
            Ok(()) => {}
            Err(ClinicError::DuplicateEmail) => {
                return Err(AuthError::validation("email", "a user with this email address exists"))
            }
            Err(e) => return Err(e.into()),
        }
        account.password.clear_plaintext();
        info!("updated account {} to version {}", account.id, account.version);

        if account.email != old_email {
            self.tokens
                .revoke_all_for_principal(TokenScope::Authentication, &old_email)
                .await?;
        }
        Ok(account)
    }
}
