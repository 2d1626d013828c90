//! Role and permission administration endpoints.
//!
//! All of them require the "Admin" role.

use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Route, State};

use super::MessageResponse;
use crate::auth::role_admin::{
    self, AssignPermissionsRequest, CreateRoleRequest, UpdateRoleRequest,
};
use crate::auth::{AuthContext, AuthError};
use crate::logged_json::LoggedJson;
use crate::models::{Permission, Role};
use crate::orm::DbConn;
use crate::session_guards::AdminUser;

/// List Roles endpoint.
///
/// - **URL:** `/api/v1/roles`
/// - **Method:** `GET`
#[get("/roles")]
pub async fn list_roles(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
) -> Result<Json<Vec<Role>>, AuthError> {
    role_admin::list_roles(&db, ctx).await.map(Json)
}

/// Create Role endpoint.
///
/// - **URL:** `/api/v1/roles`
/// - **Method:** `POST`
///
/// # Request Format
///
/// ```json
/// { "name": "Cashier", "description": "Point of sale" }
/// ```
///
/// New roles start with no permissions; see `PUT /roles/<id>/permissions`.
#[post("/roles", data = "<request>")]
pub async fn create_role(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
    request: LoggedJson<CreateRoleRequest>,
) -> Result<status::Created<Json<Role>>, AuthError> {
    let role = role_admin::create_role(&db, ctx, request.into_inner()).await?;
    let location = format!("/api/v1/roles/{}", role.id);
    Ok(status::Created::new(location).body(Json(role)))
}

/// Update Role endpoint. System roles answer 403.
#[put("/roles/<role_id>", data = "<request>")]
pub async fn update_role(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
    role_id: i32,
    request: LoggedJson<UpdateRoleRequest>,
) -> Result<Json<Role>, AuthError> {
    role_admin::update_role(&db, ctx, role_id, request.into_inner())
        .await
        .map(Json)
}

/// Delete Role endpoint.
///
/// System roles answer 403; roles still assigned to users answer 409.
#[delete("/roles/<role_id>")]
pub async fn delete_role(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
    role_id: i32,
) -> Result<Json<MessageResponse>, AuthError> {
    role_admin::delete_role(&db, ctx, role_id).await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}

#[get("/roles/<role_id>/permissions")]
pub async fn get_role_permissions(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
    role_id: i32,
) -> Result<Json<Vec<Permission>>, AuthError> {
    role_admin::role_permissions(&db, ctx, role_id)
        .await
        .map(Json)
}

/// Assign Permissions endpoint.
///
/// - **URL:** `/api/v1/roles/<role_id>/permissions`
/// - **Method:** `PUT`
///
/// Replaces the role's permission set. Unknown names answer 400 and leave
/// the set unchanged.
///
/// # Request Format
///
/// ```json
/// { "permissions": ["VIEW_SALES", "CREATE_SALES"] }
/// ```
#[put("/roles/<role_id>/permissions", data = "<request>")]
pub async fn put_role_permissions(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
    role_id: i32,
    request: LoggedJson<AssignPermissionsRequest>,
) -> Result<Json<Vec<Permission>>, AuthError> {
    role_admin::assign_permissions(&db, ctx, role_id, request.into_inner())
        .await
        .map(Json)
}

/// List Permissions endpoint.
///
/// - **URL:** `/api/v1/permissions`
/// - **Method:** `GET`
#[get("/permissions")]
pub async fn list_permissions(
    db: DbConn,
    ctx: &State<AuthContext>,
    _admin: AdminUser,
) -> Result<Json<Vec<Permission>>, AuthError> {
    role_admin::list_permissions(&db, ctx).await.map(Json)
}

pub fn routes() -> Vec<Route> {
    routes![
        list_roles,
        create_role,
        update_role,
        delete_role,
        get_role_permissions,
        put_role_permissions,
        list_permissions
    ]
}
