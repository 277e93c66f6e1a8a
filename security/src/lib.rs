// security/src/lib.rs
//! Token issuance and validation, the per-endpoint role gate, and the account
//! flows (register, log in, edit profile) that hand tokens out.

pub mod accounts;
pub mod errors;
pub mod gate;
pub mod tokens;

pub use accounts::{AccountService, ProfileUpdate, Registration};
pub use errors::{AuthError, AuthResult};
pub use gate::AuthorizationGate;
pub use tokens::{
    generate_token, hash_plaintext, validate_token_plaintext, Token, TokenService, DEFAULT_TOKEN_TTL_HOURS,
    TOKEN_PLAINTEXT_LEN,
};
