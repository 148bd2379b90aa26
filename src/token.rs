//! Bearer-token signing for delivery requests.
//!
//! Delivery treats signing as an opaque collaborator: the worker asks
//! for a token per attempt and attaches it as `Authorization: Bearer`.
//! The shipped implementation signs HS256 JWTs; the key and algorithm
//! are configuration, not the delivery core's concern.

use std::fmt;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token validity window.
pub const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the record's service.
    sub: String,
    /// Issued at (Unix timestamp).
    iat: i64,
    /// Expiry (Unix timestamp).
    exp: i64,
}

/// Mints a bearer token for a service. Implementations must be cheap
/// enough to call once per delivery attempt.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, service: &str) -> Result<String, SignError>;
}

/// HS256 JWT signer over `{sub, iat, exp}` claims.
pub struct JwtSigner {
    encoding_key: EncodingKey,
}

impl JwtSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, service: &str) -> Result<String, SignError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: service.to_owned(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?;
        Ok(token)
    }
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation};

    use super::*;

    #[test]
    fn signs_a_decodable_hs256_token() {
        let signer = JwtSigner::new("test-secret");
        let token = signer.sign("billing").expect("sign");
        assert_eq!(token.split('.').count(), 3);

        let decoded = jsonwebtoken::decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .expect("decode");
        assert_eq!(decoded.claims.sub, "billing");
        assert_eq!(decoded.claims.exp - decoded.claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn tokens_for_different_services_differ() {
        let signer = JwtSigner::new("test-secret");
        let a = signer.sign("billing").expect("sign");
        let b = signer.sign("checkout").expect("sign");
        assert_ne!(a, b);
    }
}
