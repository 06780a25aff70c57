//! Session token codec.
//!
//! Tokens are HS256 JWTs carrying the principal identity, display name, role and the
//! invalidation epoch captured at issuance. The codec never touches storage: a token
//! with a stale epoch still verifies here and is rejected by the Session Guard.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::models::Role;
use crate::auth::principal::Principal;
use crate::domain::PrincipalId;
use crate::errors::{Error, Result};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Principal id rendered as a string
    pub sub: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    /// Invalidation epoch at issuance
    pub token_version: i32,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn principal_id(&self) -> std::result::Result<PrincipalId, InvalidToken> {
        self.sub.parse().map_err(|_| InvalidToken)
    }
}

/// Verification failure. Malformed input, a bad signature and expiry all collapse
/// into this one value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid token")]
pub struct InvalidToken;

/// Issues and verifies signed session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec signing with `secret`; issued tokens live for `ttl`.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for the principal's current state.
    pub fn issue(&self, principal: &Principal) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal.id.to_string(),
            username: principal.username.clone(),
            full_name: principal.full_name.clone(),
            role: principal.role,
            token_version: principal.token_version,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("Failed to sign session token: {}", e)))
    }

    /// Check signature and expiry and return the embedded claims.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, InvalidToken> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| InvalidToken)?;
        claims.principal_id()?;
        Ok(claims)
    }
}
