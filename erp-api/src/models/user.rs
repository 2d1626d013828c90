use chrono::NaiveDateTime;
use diesel::{Identifiable, Insertable, Queryable};

use crate::schema::users;

#[derive(Queryable, Identifiable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String, // Will be unique
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_id: Option<i32>,
    pub location_id: Option<i32>,
    pub role_id: Option<i32>,
    pub is_active: bool,
    pub is_locked: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    /// Whether the account may authenticate at all.
    pub fn can_sign_in(&self) -> bool {
        self.is_active && !self.is_locked
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_id: Option<i32>,
    pub location_id: Option<i32>,
    pub role_id: Option<i32>,
    pub is_active: bool,
    pub is_locked: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// User fields supplied by callers; timestamps and flags are filled in
/// by `insert_user`.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_id: Option<i32>,
    pub location_id: Option<i32>,
    pub role_id: Option<i32>,
}
