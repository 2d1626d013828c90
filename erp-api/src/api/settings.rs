//! Per-company settings consumed by the session registry.

use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::auth::{AuthContext, AuthError};
use crate::logged_json::LoggedJson;
use crate::models::DeviceControl;
use crate::orm::company_setting::{
    delete_session_limit, get_device_control, get_session_limit, set_device_control,
    set_session_limit,
};
use crate::orm::device_session::count_live_for_company;
use crate::orm::{DbConn, run_store};
use crate::session_guards::{SettingsManager, SettingsViewer};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionLimitView {
    pub company_id: i32,
    /// `None` means unlimited.
    pub max_sessions: Option<i64>,
    pub active_sessions: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct SessionLimitRequest {
    pub max_sessions: i64,
}

async fn session_limit_view(
    db: &DbConn,
    ctx: &AuthContext,
    company_id: i32,
) -> Result<SessionLimitView, AuthError> {
    run_store(db, ctx.config.store_timeout(), move |conn| {
        Ok::<_, diesel::result::Error>(SessionLimitView {
            company_id,
            max_sessions: get_session_limit(conn, company_id)?,
            active_sessions: count_live_for_company(conn, company_id)?,
        })
    })
    .await
}

/// Get Session Limit endpoint.
///
/// - **URL:** `/api/v1/settings/session-limit`
/// - **Method:** `GET`
/// - **Authorization:** `VIEW_SETTINGS`
#[get("/settings/session-limit")]
pub async fn get_limit(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SettingsViewer,
) -> Result<Json<SessionLimitView>, AuthError> {
    session_limit_view(&db, ctx, user.company_id).await.map(Json)
}

async fn apply_limit(
    db: DbConn,
    ctx: &AuthContext,
    user: SettingsManager,
    request: SessionLimitRequest,
) -> Result<Json<SessionLimitView>, AuthError> {
    if request.max_sessions < 1 {
        return Err(AuthError::bad_request("max_sessions must be at least 1"));
    }
    let company_id = user.company_id;
    let max_sessions = request.max_sessions;
    run_store(&db, ctx.config.store_timeout(), move |conn| {
        set_session_limit(conn, company_id, max_sessions)
    })
    .await?;

    info!(
        "User {} set session limit of company {} to {}",
        user.user.user_id(),
        company_id,
        max_sessions
    );
    session_limit_view(&db, ctx, company_id).await.map(Json)
}

/// Set Session Limit endpoint.
///
/// - **URL:** `/api/v1/settings/session-limit`
/// - **Method:** `PUT` or `POST`
/// - **Authorization:** `MANAGE_SETTINGS`
///
/// Lowering the limit below the number of live sessions revokes nothing;
/// it only stops new devices from signing in.
///
/// # Request Format
///
/// ```json
/// { "max_sessions": 5 }
/// ```
#[put("/settings/session-limit", data = "<request>")]
pub async fn put_limit(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SettingsManager,
    request: LoggedJson<SessionLimitRequest>,
) -> Result<Json<SessionLimitView>, AuthError> {
    apply_limit(db, ctx, user, request.into_inner()).await
}

#[post("/settings/session-limit", data = "<request>")]
pub async fn post_limit(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SettingsManager,
    request: LoggedJson<SessionLimitRequest>,
) -> Result<Json<SessionLimitView>, AuthError> {
    apply_limit(db, ctx, user, request.into_inner()).await
}

/// Remove Session Limit endpoint.
///
/// - **URL:** `/api/v1/settings/session-limit`
/// - **Method:** `DELETE`
/// - **Authorization:** `MANAGE_SETTINGS`
#[delete("/settings/session-limit")]
pub async fn delete_limit(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SettingsManager,
) -> Result<Json<SessionLimitView>, AuthError> {
    let company_id = user.company_id;
    run_store(&db, ctx.config.store_timeout(), move |conn| {
        delete_session_limit(conn, company_id)
    })
    .await?;
    session_limit_view(&db, ctx, company_id).await.map(Json)
}

/// Get Device Control endpoint.
///
/// - **URL:** `/api/v1/settings/device-control`
/// - **Method:** `GET`
/// - **Authorization:** `VIEW_SETTINGS`
#[get("/settings/device-control")]
pub async fn get_devices(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SettingsViewer,
) -> Result<Json<DeviceControl>, AuthError> {
    let company_id = user.company_id;
    run_store(&db, ctx.config.store_timeout(), move |conn| {
        get_device_control(conn, company_id)
    })
    .await
    .map(Json)
}

/// Set Device Control endpoint.
///
/// - **URL:** `/api/v1/settings/device-control`
/// - **Method:** `PUT`
/// - **Authorization:** `MANAGE_SETTINGS`
///
/// Only affects future logins; live sessions on devices no longer allowed
/// stay live until revoked.
///
/// # Request Format
///
/// ```json
/// { "restrict_devices": true, "allowed_device_ids": ["till-1", "till-2"] }
/// ```
#[put("/settings/device-control", data = "<request>")]
pub async fn put_devices(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SettingsManager,
    request: LoggedJson<DeviceControl>,
) -> Result<Json<DeviceControl>, AuthError> {
    let mut control = request.into_inner();
    control.allowed_device_ids = control
        .allowed_device_ids
        .iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    control.allowed_device_ids.sort();
    control.allowed_device_ids.dedup();

    let company_id = user.company_id;
    let stored = control.clone();
    run_store(&db, ctx.config.store_timeout(), move |conn| {
        set_device_control(conn, company_id, &stored)
    })
    .await?;
    Ok(Json(control))
}

pub fn routes() -> Vec<Route> {
    routes![
        get_limit,
        put_limit,
        post_limit,
        delete_limit,
        get_devices,
        put_devices
    ]
}
