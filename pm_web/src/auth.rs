//! ABOUTME: Authentication utilities for password hashing and JWT operations
//! ABOUTME: Issues role-carrying tokens for buyers, sellers and admins

use crate::models::Claims;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use pm_core::{Error, Result, Role};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Name of the cookie carrying the session token
pub const AUTH_COOKIE: &str = "auth_token";

/// Password hashing utilities
pub struct PasswordAuth;

impl PasswordAuth {
    /// Hash a password using Argon2
    #[instrument(skip(password))]
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Config(format!("Failed to hash password: {}", e)))
    }

    /// Verify a password against a hash
    #[instrument(skip(password, hash))]
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("Invalid password hash format: {}", e)))?;

        let valid = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();

        debug!("Password verification result: {}", valid);
        Ok(valid)
    }
}

/// JWT token utilities
pub struct JwtAuth;

impl JwtAuth {
    /// JWT token expiration time in seconds (24 hours)
    const TOKEN_EXPIRATION_SECS: u64 = 24 * 60 * 60;

    /// Create a new JWT token for a user
    #[instrument(skip(email, secret))]
    pub fn create_token(user_id: &str, email: &str, role: Role, secret: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Config(format!("Time error: {}", e)))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            exp: now + Self::TOKEN_EXPIRATION_SECS as usize,
            iat: now,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .map_err(|e| Error::Config(format!("Failed to create JWT: {}", e)))?;

        debug!("JWT token created for user: {}", user_id);
        Ok(token)
    }

    /// Verify and decode a JWT token
    #[instrument(skip(token, secret))]
    pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| Error::Validation(format!("Invalid JWT: {}", e)))
    }

    pub fn token_expiration_secs() -> u64 {
        Self::TOKEN_EXPIRATION_SECS
    }
}
