use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::validator::{matches, Validator, EMAIL_RX};

pub const BCRYPT_COST: u32 = 12;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("stored password hash is not valid UTF-8")]
    CorruptHash,

    #[error("missing password hash for user")]
    MissingHash,
}

/// bcrypt-hashed password. The plaintext is only retained between parsing a
/// request and validating it.
#[derive(Clone, Default)]
pub struct Password {
    plaintext: Option<String>,
    hash: Option<Vec<u8>>,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("hash", &self.hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Password {
    /// CPU bound; call from a blocking task.
    pub fn hash(plaintext: &str) -> Result<Self, PasswordError> {
        let hash = bcrypt::hash(plaintext, BCRYPT_COST)?;
        Ok(Self {
            plaintext: Some(plaintext.to_string()),
            hash: Some(hash.into_bytes()),
        })
    }

    pub fn from_hash(hash: Vec<u8>) -> Self {
        Self { plaintext: None, hash: Some(hash) }
    }

    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_deref()
    }

    pub fn hash_bytes(&self) -> Option<&[u8]> {
        self.hash.as_deref()
    }

    /// CPU bound; call from a blocking task.
    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let hash = self.hash.as_deref().ok_or(PasswordError::MissingHash)?;
        let hash = std::str::from_utf8(hash).map_err(|_| PasswordError::CorruptHash)?;
        Ok(bcrypt::verify(plaintext, hash)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    pub fn new(name: String, email: String, password: Password) -> Self {
        Self {
            id: Uuid::nil(),
            created_at: Utc::now(),
            name,
            email,
            password,
            activated: false,
            version: 0,
        }
    }
}

pub fn validate_name(v: &mut Validator, name: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches(email, &EMAIL_RX), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

/// Field errors land in `v`; a user without a password hash is a bug in the
/// caller and comes back as `Err`.
pub fn validate_user(v: &mut Validator, user: &User) -> Result<(), PasswordError> {
    validate_name(v, &user.name);
    validate_email(v, &user.email);

    if let Some(plaintext) = user.password.plaintext() {
        validate_password_plaintext(v, plaintext);
    }

    if user.password.hash_bytes().is_none() {
        return Err(PasswordError::MissingHash);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip_with_low_cost_hash() {
        let hash = bcrypt::hash("pa55word", 4).unwrap();
        let password = Password::from_hash(hash.into_bytes());
        assert!(password.matches("pa55word").unwrap());
        assert!(!password.matches("pa55wordx").unwrap());
    }

    #[test]
    fn missing_hash_is_an_error_not_a_field_error() {
        let user = User::new("Alice".into(), "alice@example.com".into(), Password::default());
        let mut v = Validator::new();
        assert!(matches!(validate_user(&mut v, &user), Err(PasswordError::MissingHash)));
        assert!(v.valid());
    }

    #[test]
    fn password_length_bounds() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert_eq!(v.errors()["password"], "must not be more than 72 bytes long");
    }

    #[test]
    fn debug_does_not_leak_hash() {
        let password = Password::from_hash(b"$2b$04$abcdefghijklmnopqrstuv".to_vec());
        let rendered = format!("{:?}", password);
        assert!(!rendered.contains("abcdefgh"));
    }
}
