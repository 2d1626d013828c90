//! Permission catalogue and role→permission assignments.

use std::collections::BTreeSet;

use diesel::prelude::*;

use crate::models::{NewRolePermission, Permission, Role};
use crate::schema::{permissions, role_permissions, roles};

/// What a role is allowed to do, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrantRecord {
    pub role_id: i32,
    pub role_name: String,
    pub grants_all: bool,
    /// Joined permission names, or every known permission for a wildcard role.
    pub permissions: BTreeSet<String>,
}

pub fn get_all_permissions(
    conn: &mut SqliteConnection,
) -> Result<Vec<Permission>, diesel::result::Error> {
    permissions::table
        .order((permissions::module.asc(), permissions::name.asc()))
        .load::<Permission>(conn)
}

pub fn get_role_permissions(
    conn: &mut SqliteConnection,
    role_id: i32,
) -> Result<Vec<Permission>, diesel::result::Error> {
    role_permissions::table
        .inner_join(permissions::table)
        .filter(role_permissions::role_id.eq(role_id))
        .select(permissions::all_columns)
        .order(permissions::name.asc())
        .load::<Permission>(conn)
}

/// Loads the grant of one role; `None` if the role does not exist.
pub fn load_role_grant(
    conn: &mut SqliteConnection,
    role_id: i32,
) -> Result<Option<RoleGrantRecord>, diesel::result::Error> {
    let role = match roles::table.find(role_id).first::<Role>(conn).optional()? {
        Some(role) => role,
        None => return Ok(None),
    };

    let names: Vec<String> = if role.grants_all_permissions {
        permissions::table.select(permissions::name).load(conn)?
    } else {
        role_permissions::table
            .inner_join(permissions::table)
            .filter(role_permissions::role_id.eq(role_id))
            .select(permissions::name)
            .load(conn)?
    };

    Ok(Some(RoleGrantRecord {
        role_id: role.id,
        role_name: role.name,
        grants_all: role.grants_all_permissions,
        permissions: names.into_iter().collect(),
    }))
}

/// Replaces a role's permission set with the named permissions.
///
/// # Returns
/// * `Ok(Ok(()))` - Assignment replaced
/// * `Ok(Err(unknown))` - Nothing changed; these names do not exist
pub fn replace_role_permissions(
    conn: &mut SqliteConnection,
    role_id: i32,
    names: &[String],
) -> Result<Result<(), Vec<String>>, diesel::result::Error> {
    conn.transaction(|conn| {
        let found: Vec<Permission> = permissions::table
            .filter(permissions::name.eq_any(names))
            .load(conn)?;

        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !found.iter().any(|p| &p.name == *n))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Ok(Err(unknown));
        }

        diesel::delete(role_permissions::table.filter(role_permissions::role_id.eq(role_id)))
            .execute(conn)?;

        let rows: Vec<NewRolePermission> = found
            .iter()
            .map(|p| NewRolePermission {
                role_id,
                permission_id: p.id,
            })
            .collect();
        for row in &rows {
            diesel::insert_into(role_permissions::table)
                .values(row)
                .execute(conn)?;
        }
        Ok(Ok(()))
    })
}
