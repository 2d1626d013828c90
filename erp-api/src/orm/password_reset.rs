//! Single-use password reset tokens.
//!
//! The secret handed to the user is 32 random bytes, hex encoded. Only its
//! SHA-256 digest is stored. Consumption is one conditional UPDATE, so two
//! concurrent resets with the same token cannot both succeed.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::auth::AuthError;
use crate::models::{NewPasswordResetToken, PasswordResetToken};
use crate::schema::password_reset_tokens;

/// Fresh random secret to send to the user out of band.
pub fn generate_reset_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Digest under which a secret is stored and looked up.
pub fn digest_reset_secret(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.trim().as_bytes()))
}

/// Stores a new token for `user_id`, dropping the user's unused ones.
///
/// # Returns
/// The expiry time of the stored token
pub fn store_reset_token(
    conn: &mut SqliteConnection,
    user_id: i32,
    token_hash: &str,
    ttl: Duration,
) -> Result<NaiveDateTime, diesel::result::Error> {
    conn.transaction(|conn| {
        diesel::delete(
            password_reset_tokens::table
                .filter(password_reset_tokens::user_id.eq(user_id))
                .filter(password_reset_tokens::used_at.is_null()),
        )
        .execute(conn)?;

        let now = Utc::now().naive_utc();
        let expires_at = now + ttl;
        diesel::insert_into(password_reset_tokens::table)
            .values(&NewPasswordResetToken {
                token_hash: token_hash.to_string(),
                user_id,
                created_at: now,
                expires_at,
            })
            .execute(conn)?;
        Ok(expires_at)
    })
}

/// Marks a token used and returns its user.
///
/// Fails with `TokenAlreadyUsed` for a spent token, `TokenExpiredOrInvalid`
/// for an expired one and `NotFound` for an unknown one.
pub fn consume_reset_token(
    conn: &mut SqliteConnection,
    token_hash: &str,
) -> Result<i32, AuthError> {
    let now = Utc::now().naive_utc();
    let consumed = diesel::update(
        password_reset_tokens::table
            .filter(password_reset_tokens::token_hash.eq(token_hash))
            .filter(password_reset_tokens::used_at.is_null())
            .filter(password_reset_tokens::expires_at.gt(now)),
    )
    .set(password_reset_tokens::used_at.eq(Some(now)))
    .execute(conn)?;

    let token = password_reset_tokens::table
        .find(token_hash)
        .first::<PasswordResetToken>(conn)
        .optional()?;

    match token {
        Some(token) if consumed == 1 => Ok(token.user_id),
        Some(token) if token.used_at.is_some() => Err(AuthError::TokenAlreadyUsed),
        Some(_) => Err(AuthError::TokenExpiredOrInvalid),
        None => Err(AuthError::not_found("Reset token")),
    }
}
