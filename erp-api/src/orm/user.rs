use chrono::Utc;
use diesel::prelude::*;

use crate::models::{NewUser, User, UserInput};
use crate::orm::db::last_insert_rowid;
use crate::schema::users;

/// Inserts a new user. Emails are stored lower case.
pub fn insert_user(
    conn: &mut SqliteConnection,
    new_user: UserInput,
) -> Result<User, diesel::result::Error> {
    let now = Utc::now().naive_utc();
    let insertable_user = NewUser {
        username: new_user.username.trim().to_string(),
        email: new_user.email.trim().to_lowercase(),
        password_hash: new_user.password_hash,
        first_name: new_user.first_name,
        last_name: new_user.last_name,
        company_id: new_user.company_id,
        location_id: new_user.location_id,
        role_id: new_user.role_id,
        is_active: true,
        is_locked: false,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&insertable_user)
        .execute(conn)?;

    let last_id = last_insert_rowid(conn)?;
    users::table.filter(users::id.eq(last_id)).first::<User>(conn)
}

/// Try to find a user by id.
/// Returns Ok(Some(User)) if found, Ok(None) if not, Err on DB error.
pub fn get_user(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Option<User>, diesel::result::Error> {
    users::table
        .filter(users::id.eq(user_id))
        .first::<User>(conn)
        .optional()
}

/// Emails are stored lower case; the lookup lower-cases its input.
pub fn get_user_by_email(
    conn: &mut SqliteConnection,
    user_email: &str,
) -> Result<Option<User>, diesel::result::Error> {
    users::table
        .filter(users::email.eq(user_email.trim().to_lowercase()))
        .first::<User>(conn)
        .optional()
}

/// Whether the username or the email is already registered.
pub fn identifier_taken(
    conn: &mut SqliteConnection,
    username: &str,
    email: &str,
) -> Result<bool, diesel::result::Error> {
    let count: i64 = users::table
        .filter(
            users::username
                .eq(username.trim())
                .or(users::email.eq(email.trim().to_lowercase())),
        )
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn update_password_hash(
    conn: &mut SqliteConnection,
    user_id: i32,
    new_hash: &str,
) -> Result<usize, diesel::result::Error> {
    diesel::update(users::table.filter(users::id.eq(user_id)))
        .set((
            users::password_hash.eq(new_hash),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

pub fn record_login(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<usize, diesel::result::Error> {
    diesel::update(users::table.filter(users::id.eq(user_id)))
        .set(users::last_login.eq(Some(Utc::now().naive_utc())))
        .execute(conn)
}

/// Attaches a user to a company with a role and default location.
///
/// Fails at the store if the user already belongs to another company.
pub fn assign_company(
    conn: &mut SqliteConnection,
    user_id: i32,
    company_id: i32,
    role_id: i32,
    location_id: Option<i32>,
) -> Result<usize, diesel::result::Error> {
    diesel::update(users::table.filter(users::id.eq(user_id)))
        .set((
            users::company_id.eq(Some(company_id)),
            users::role_id.eq(Some(role_id)),
            users::location_id.eq(location_id),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

/// Number of users currently holding `role_id`.
pub fn count_users_with_role(
    conn: &mut SqliteConnection,
    role_id: i32,
) -> Result<i64, diesel::result::Error> {
    users::table
        .filter(users::role_id.eq(role_id))
        .count()
        .get_result(conn)
}
