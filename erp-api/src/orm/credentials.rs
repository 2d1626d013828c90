//! Credential store adapter.
//!
//! Looks users up by username or email and wraps the Argon2 primitives.
//! A lookup miss and a hash mismatch must look the same to callers, so this
//! module also offers [`burn_verification`] to spend the same work when no
//! account matched.

use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{self, PasswordHash, PasswordVerifier, SaltString, rand_core::OsRng},
};
use diesel::prelude::*;

use crate::models::User;
use crate::schema::users;

/// How a caller names their account when signing in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Username(String),
    Email(String),
}

impl LoginIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            LoginIdentifier::Username(name) => name,
            LoginIdentifier::Email(email) => email,
        }
    }
}

/// Finds a user by username or by email, never both.
///
/// A username only matches the username column; an email only matches the
/// email column, compared lower case since emails are stored that way.
///
/// # Returns
/// * `Ok(Some(User))` - The user the identifier names
/// * `Ok(None)` - No such user
/// * `Err(diesel::result::Error)` - Database query failed
pub fn find_user_by_identifier(
    conn: &mut SqliteConnection,
    identifier: &LoginIdentifier,
) -> Result<Option<User>, diesel::result::Error> {
    match identifier {
        LoginIdentifier::Username(name) => users::table
            .filter(users::username.eq(name.trim()))
            .first::<User>(conn)
            .optional(),
        LoginIdentifier::Email(email) => users::table
            .filter(users::email.eq(email.trim().to_lowercase()))
            .first::<User>(conn)
            .optional(),
    }
}

/// Verifies a password against a stored hash.
///
/// A stored value that is not a valid PHC string never matches.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(stored_hash) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Stored password hash could not be parsed: {}", e);
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hashes a password using Argon2 with a random salt.
///
/// # Returns
/// Argon2 PHC string suitable for database storage
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Performs one throwaway verification so an unknown identifier costs as
/// much as a wrong password.
pub fn burn_verification(password: &str) {
    let dummy = DUMMY_HASH.get_or_init(|| hash_password("not-a-real-account").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
}
