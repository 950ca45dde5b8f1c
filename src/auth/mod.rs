//! Opaque bearer tokens: generation, hashing, validation and revocation.
//!
//! The plaintext is 26 characters drawn from the RFC 4648 base32 alphabet
//! (130 bits from the OS RNG). Only its SHA-256 digest is stored, so a leaked
//! tokens table holds nothing that can be presented as a credential.

use chrono::{Duration, Utc};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{Token, TokenScope, User};
use crate::database::{DatabaseError, TokenRepository, UserRepository};
use crate::error::ApiError;
use crate::validator::Validator;

pub const TOKEN_LENGTH: usize = 26;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

pub fn authentication_ttl() -> Duration {
    Duration::hours(24)
}

pub fn activation_ttl() -> Duration {
    Duration::days(3)
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed(Validator),

    #[error("token not found or expired")]
    NotFound,

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for TokenError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => TokenError::NotFound,
            other => TokenError::Database(other),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(v) => v.into(),
            TokenError::NotFound => ApiError::InvalidAuthenticationToken,
            TokenError::Database(e) => e.into(),
        }
    }
}

pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn generate_plaintext() -> String {
    let mut rng = OsRng;
    (0..TOKEN_LENGTH)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

pub fn generate_token(user_id: Uuid, ttl: Duration, scope: TokenScope) -> Token {
    let plaintext = generate_plaintext();
    let hash = hash_plaintext(&plaintext);
    Token {
        plaintext,
        hash,
        user_id,
        expiry: Utc::now() + ttl,
        scope,
    }
}

/// Shape check that runs before any storage round trip.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == TOKEN_LENGTH, "token", "must be 26 bytes long");
}

#[derive(Clone)]
pub struct TokenService {
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
}

impl TokenService {
    pub fn new(tokens: Arc<dyn TokenRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { tokens, users }
    }

    /// Creates and stores a token; the returned value is the only place the
    /// plaintext ever exists.
    pub async fn issue(&self, user_id: Uuid, ttl: Duration, scope: TokenScope) -> Result<Token, TokenError> {
        let token = generate_token(user_id, ttl, scope);
        self.tokens.insert(&token).await.map_err(TokenError::Database)?;
        tracing::debug!(%user_id, scope = scope.as_str(), expiry = %token.expiry, "issued token");
        Ok(token)
    }

    /// Owner of an unexpired token. Unknown and expired tokens are both `NotFound`.
    pub async fn validate(&self, scope: TokenScope, plaintext: &str) -> Result<User, TokenError> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        if !v.valid() {
            return Err(TokenError::Malformed(v));
        }

        let hash = hash_plaintext(plaintext);
        Ok(self.users.get_for_token(scope, &hash, Utc::now()).await?)
    }

    pub async fn revoke_all(&self, scope: TokenScope, user_id: Uuid) -> Result<(), TokenError> {
        self.tokens
            .delete_all_for_user(scope, user_id)
            .await
            .map_err(TokenError::Database)?;
        tracing::debug!(%user_id, scope = scope.as_str(), "revoked tokens");
        Ok(())
    }
}
