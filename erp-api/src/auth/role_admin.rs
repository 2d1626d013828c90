//! Role and permission administration.
//!
//! Every write invalidates the permission cache before returning, so the
//! next authorization check in this process sees the new assignment.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::context::AuthContext;
use super::error::AuthError;
use crate::models::{NewRole, Permission, Role};
use crate::orm::permission::{get_all_permissions, get_role_permissions, replace_role_permissions};
use crate::orm::role::{delete_role as remove_role, get_all_roles, get_role, insert_role};
use crate::orm::user::count_users_with_role;
use crate::orm::{DbRunner, role, run_store};

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update. An empty description clears it.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct AssignPermissionsRequest {
    pub permissions: Vec<String>,
}

fn load_role(conn: &mut diesel::SqliteConnection, role_id: i32) -> Result<Role, AuthError> {
    get_role(conn, role_id)?.ok_or_else(|| AuthError::not_found("Role"))
}

fn editable(role: Role) -> Result<Role, AuthError> {
    if role.is_system_role {
        Err(AuthError::forbidden("system roles cannot be modified"))
    } else {
        Ok(role)
    }
}

pub async fn list_roles<D: DbRunner>(db: &D, ctx: &AuthContext) -> Result<Vec<Role>, AuthError> {
    run_store(db, ctx.config.store_timeout(), get_all_roles).await
}

/// Roles created here never carry the system or wildcard flags.
pub async fn create_role<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    request: CreateRoleRequest,
) -> Result<Role, AuthError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AuthError::bad_request("Role name is required"));
    }
    let new_role = NewRole {
        name,
        description: request.description.filter(|d| !d.trim().is_empty()),
        is_system_role: false,
        grants_all_permissions: false,
    };

    let created = run_store(db, ctx.config.store_timeout(), move |conn| {
        insert_role(conn, new_role)
    })
    .await
    .map_err(|e| match e {
        AuthError::Conflict(_) => AuthError::conflict("Role name already exists"),
        other => other,
    })?;

    info!("Created role {} ('{}')", created.id, created.name);
    Ok(created)
}

pub async fn update_role<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    role_id: i32,
    request: UpdateRoleRequest,
) -> Result<Role, AuthError> {
    let name = match request.name.map(|n| n.trim().to_string()) {
        Some(n) if n.is_empty() => return Err(AuthError::bad_request("Role name is required")),
        other => other,
    };
    let description = request
        .description
        .map(|d| Some(d.trim().to_string()).filter(|d| !d.is_empty()));

    let updated = run_store(db, ctx.config.store_timeout(), move |conn| {
        conn.immediate_transaction(|conn| -> Result<Role, AuthError> {
            editable(load_role(conn, role_id)?)?;
            Ok(role::update_role(conn, role_id, name, description)?)
        })
    })
    .await?;

    ctx.resolver.invalidate(role_id);
    Ok(updated)
}

/// Refuses system roles and roles still held by a user.
pub async fn delete_role<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    role_id: i32,
) -> Result<(), AuthError> {
    run_store(db, ctx.config.store_timeout(), move |conn| {
        conn.immediate_transaction(|conn| -> Result<(), AuthError> {
            editable(load_role(conn, role_id)?)?;
            if count_users_with_role(conn, role_id)? > 0 {
                return Err(AuthError::conflict("Role is still assigned to users"));
            }
            remove_role(conn, role_id)?;
            Ok(())
        })
    })
    .await?;

    ctx.resolver.invalidate_all();
    info!("Deleted role {}", role_id);
    Ok(())
}

pub async fn list_permissions<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
) -> Result<Vec<Permission>, AuthError> {
    run_store(db, ctx.config.store_timeout(), get_all_permissions).await
}

pub async fn role_permissions<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    role_id: i32,
) -> Result<Vec<Permission>, AuthError> {
    run_store(db, ctx.config.store_timeout(), move |conn| {
        load_role(conn, role_id)?;
        Ok::<_, AuthError>(get_role_permissions(conn, role_id)?)
    })
    .await
}

/// Replaces the permission set of a role in one transaction.
pub async fn assign_permissions<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    role_id: i32,
    request: AssignPermissionsRequest,
) -> Result<Vec<Permission>, AuthError> {
    let mut names: Vec<String> = request
        .permissions
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();

    let assigned = run_store(db, ctx.config.store_timeout(), move |conn| {
        conn.immediate_transaction(|conn| -> Result<Vec<Permission>, AuthError> {
            editable(load_role(conn, role_id)?)?;
            if let Err(unknown) = replace_role_permissions(conn, role_id, &names)? {
                return Err(AuthError::bad_request(format!(
                    "Unknown permissions: {}",
                    unknown.join(", ")
                )));
            }
            Ok(get_role_permissions(conn, role_id)?)
        })
    })
    .await?;

    ctx.resolver.invalidate(role_id);
    info!(
        "Role {} now has {} permission(s)",
        role_id,
        assigned.len()
    );
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::config::AuthConfig;
    use crate::auth::notifier::LogNotifier;
    use crate::orm::role::get_role_by_name;
    use crate::orm::testing::{
        FakeDbConn, TEST_JWT_SECRET, seed_test_data, setup_test_db, setup_test_dbconn,
    };

    fn context() -> AuthContext {
        let config = AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            ..AuthConfig::default()
        };
        AuthContext::new(config, Arc::new(LogNotifier)).unwrap()
    }

    fn seeded() -> FakeDbConn {
        let mut conn = setup_test_db();
        seed_test_data(&mut conn).unwrap();
        setup_test_dbconn(conn)
    }

    async fn role_id(db: &FakeDbConn, name: &'static str) -> i32 {
        db.run(move |c| get_role_by_name(c, name).unwrap().unwrap().id)
            .await
    }

    #[rocket::async_test]
    async fn test_assign_invalidates_cached_grant() {
        let db = seeded();
        let ctx = context();
        let cashier = role_id(&db, "Cashier").await;

        assert!(!ctx.resolver.has_permission(&db, Some(cashier), "VIEW_SALES").await.unwrap());

        let assigned = assign_permissions(
            &db,
            &ctx,
            cashier,
            AssignPermissionsRequest {
                permissions: vec!["VIEW_SALES".to_string(), "CREATE_SALES".to_string()],
            },
        )
        .await
        .unwrap();
        assert_eq!(assigned.len(), 2);
        assert!(ctx.resolver.has_permission(&db, Some(cashier), "VIEW_SALES").await.unwrap());

        assign_permissions(
            &db,
            &ctx,
            cashier,
            AssignPermissionsRequest {
                permissions: vec!["VIEW_SALES".to_string()],
            },
        )
        .await
        .unwrap();
        assert!(!ctx.resolver.has_permission(&db, Some(cashier), "CREATE_SALES").await.unwrap());
    }

    #[rocket::async_test]
    async fn test_unknown_permission_is_bad_request() {
        let db = seeded();
        let ctx = context();
        let cashier = role_id(&db, "Cashier").await;

        let err = assign_permissions(
            &db,
            &ctx,
            cashier,
            AssignPermissionsRequest {
                permissions: vec!["FLY".to_string()],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        assert_eq!(role_permissions(&db, &ctx, cashier).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn test_system_role_is_protected() {
        let db = seeded();
        let ctx = context();
        let admin = role_id(&db, "Admin").await;

        assert!(matches!(
            update_role(&db, &ctx, admin, UpdateRoleRequest {
                name: Some("Boss".to_string()),
                description: None,
            })
            .await
            .unwrap_err(),
            AuthError::Forbidden(_)
        ));
        assert!(matches!(
            delete_role(&db, &ctx, admin).await.unwrap_err(),
            AuthError::Forbidden(_)
        ));
    }

    #[rocket::async_test]
    async fn test_delete_role_in_use_conflicts() {
        let db = seeded();
        let ctx = context();
        let cashier = role_id(&db, "Cashier").await;

        assert!(matches!(
            delete_role(&db, &ctx, cashier).await.unwrap_err(),
            AuthError::Conflict(_)
        ));

        let temp = create_role(
            &db,
            &ctx,
            CreateRoleRequest {
                name: "Temp".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        delete_role(&db, &ctx, temp.id).await.unwrap();
        assert!(matches!(
            delete_role(&db, &ctx, temp.id).await.unwrap_err(),
            AuthError::NotFound(_)
        ));
    }

    #[rocket::async_test]
    async fn test_duplicate_role_name_conflicts() {
        let db = seeded();
        let ctx = context();
        let err = create_role(
            &db,
            &ctx,
            CreateRoleRequest {
                name: "Manager".to_string(),
                description: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[rocket::async_test]
    async fn test_rename_and_clear_description() {
        let db = seeded();
        let ctx = context();
        let manager = role_id(&db, "Manager").await;

        let updated = update_role(
            &db,
            &ctx,
            manager,
            UpdateRoleRequest {
                name: Some("Store Manager".to_string()),
                description: Some(String::new()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Store Manager");
        assert_eq!(updated.description, None);
        assert!(ctx.resolver.has_role(&db, Some(manager), "Store Manager").await.unwrap());
    }
}
