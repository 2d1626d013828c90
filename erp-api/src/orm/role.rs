use diesel::prelude::*;

use crate::models::{NewRole, Role};
use crate::orm::db::last_insert_rowid;
use crate::schema::roles;

/// Returns all roles in ascending order by id.
pub fn get_all_roles(conn: &mut SqliteConnection) -> Result<Vec<Role>, diesel::result::Error> {
    roles::table.order(roles::id.asc()).load::<Role>(conn)
}

pub fn get_role(
    conn: &mut SqliteConnection,
    role_id: i32,
) -> Result<Option<Role>, diesel::result::Error> {
    roles::table.find(role_id).first::<Role>(conn).optional()
}

pub fn get_role_by_name(
    conn: &mut SqliteConnection,
    role_name: &str,
) -> Result<Option<Role>, diesel::result::Error> {
    roles::table
        .filter(roles::name.eq(role_name))
        .first::<Role>(conn)
        .optional()
}

pub fn insert_role(
    conn: &mut SqliteConnection,
    new_role: NewRole,
) -> Result<Role, diesel::result::Error> {
    diesel::insert_into(roles::table)
        .values(&new_role)
        .execute(conn)?;

    let last_id = last_insert_rowid(conn)?;
    roles::table.find(last_id).first::<Role>(conn)
}

/// Partial update. `description` is `Some(None)` to clear it.
pub fn update_role(
    conn: &mut SqliteConnection,
    role_id: i32,
    new_name: Option<String>,
    new_description: Option<Option<String>>,
) -> Result<Role, diesel::result::Error> {
    if let Some(new_name) = new_name {
        diesel::update(roles::table.find(role_id))
            .set(roles::name.eq(new_name))
            .execute(conn)?;
    }
    if let Some(new_description) = new_description {
        diesel::update(roles::table.find(role_id))
            .set(roles::description.eq(new_description))
            .execute(conn)?;
    }
    roles::table.find(role_id).first::<Role>(conn)
}

/// Returns true if the role existed.
pub fn delete_role(
    conn: &mut SqliteConnection,
    role_id: i32,
) -> Result<bool, diesel::result::Error> {
    let deleted = diesel::delete(roles::table.find(role_id)).execute(conn)?;
    Ok(deleted > 0)
}
