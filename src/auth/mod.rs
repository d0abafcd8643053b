// Authentication module
// Session token issuing, password hashing and credential verification

mod types;
mod token;
mod verifier;
pub mod password;

pub use token::{TokenSigner, DEFAULT_TOKEN_TTL};
pub use types::{AuthFailure, Identity, SharedSecret, TokenDecode};
pub use verifier::CredentialVerifier;
