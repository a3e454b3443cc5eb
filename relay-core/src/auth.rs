//! Client identity verification.

use crate::error::AuthError;

/// Maps a bearer token to the client identity it was issued for
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<String, AuthError>;
}
