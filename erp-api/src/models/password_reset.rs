use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable};

use crate::schema::password_reset_tokens;

/// A stored reset token. Only the SHA-256 digest of the secret is kept.
#[derive(Queryable, Debug, Clone)]
pub struct PasswordResetToken {
    pub token_hash: String,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub used_at: Option<NaiveDateTime>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = password_reset_tokens)]
pub struct NewPasswordResetToken {
    pub token_hash: String,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
