//! Authentication endpoints: login, token refresh, password flows and the
//! caller's own session.

use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Route, State};

use super::MessageResponse;
use crate::auth::service::{
    self, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, MeResponse,
    RefreshRequest, RefreshResponse, RegisterRequest, ResetPasswordRequest, UserProfile,
};
use crate::auth::{AuthContext, AuthError};
use crate::logged_json::LoggedJson;
use crate::orm::DbConn;
use crate::session_guards::AuthenticatedUser;

/// Login endpoint.
///
/// - **URL:** `/api/v1/auth/login`
/// - **Method:** `POST`
/// - **Authentication:** None
///
/// Opens a session for one device. Logging in again from the same
/// `device_id` replaces that device's session instead of adding one.
///
/// # Request Format
///
/// ```json
/// {
///   "username": "alice",
///   "password": "secret",
///   "device_id": "till-7",
///   "device_name": "Front till",
///   "location_id": 3,
///   "include_preferences": true
/// }
/// ```
///
/// `email` may be sent instead of `username`.
///
/// # Response
///
/// **Success (HTTP 200 OK):** tokens, `session_id`, the user, their company
/// and permission names.
///
/// **Failure:**
/// - 401 `invalid_credentials` for any identity or password problem
/// - 429 `session_limit_exceeded` when the company is at its cap
/// - 403 `forbidden` for a disallowed device or a foreign location
#[post("/auth/login", data = "<request>")]
pub async fn login(
    db: DbConn,
    ctx: &State<AuthContext>,
    request: LoggedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    service::login(&db, ctx, request.into_inner()).await.map(Json)
}

/// Refresh endpoint.
///
/// - **URL:** `/api/v1/auth/refresh-token`
/// - **Method:** `POST`
///
/// Exchanges a refresh token on a live session for a new access token
/// carrying the user's current company and role.
#[post("/auth/refresh-token", data = "<request>")]
pub async fn refresh_token(
    db: DbConn,
    ctx: &State<AuthContext>,
    request: LoggedJson<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    service::refresh(&db, ctx, &request.refresh_token)
        .await
        .map(Json)
}

/// Registration endpoint.
///
/// - **URL:** `/api/v1/auth/register`
/// - **Method:** `POST`
///
/// Creates a user with no company and no role. Returns 201 with the user,
/// or 409 when the username or email is taken.
#[post("/auth/register", data = "<request>")]
pub async fn register(
    db: DbConn,
    ctx: &State<AuthContext>,
    request: LoggedJson<RegisterRequest>,
) -> Result<status::Created<Json<UserProfile>>, AuthError> {
    let profile = service::register(&db, ctx, request.into_inner()).await?;
    Ok(status::Created::new("/api/v1/auth/me").body(Json(profile)))
}

/// Forgot-password endpoint.
///
/// - **URL:** `/api/v1/auth/forgot-password`
/// - **Method:** `POST`
///
/// Always answers the same way, whether or not the email is registered.
#[post("/auth/forgot-password", data = "<request>")]
pub async fn forgot_password(
    db: DbConn,
    ctx: &State<AuthContext>,
    request: LoggedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    service::forgot_password(&db, ctx, &request.email).await?;
    Ok(Json(MessageResponse::new(
        "If the email is registered, a reset link has been sent",
    )))
}

/// Reset-password endpoint.
///
/// - **URL:** `/api/v1/auth/reset-password`
/// - **Method:** `POST`
///
/// Spends a reset token. A token works once: reuse answers 410
/// `token_already_used`. Every session of the user is revoked.
#[post("/auth/reset-password", data = "<request>")]
pub async fn reset_password(
    db: DbConn,
    ctx: &State<AuthContext>,
    request: LoggedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    service::reset_password(&db, ctx, request.into_inner()).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// Change-password endpoint.
///
/// - **URL:** `/api/v1/auth/change-password`
/// - **Method:** `POST`
/// - **Authentication:** Access token
#[post("/auth/change-password", data = "<request>")]
pub async fn change_password(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: AuthenticatedUser,
    request: LoggedJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    service::change_password(&db, ctx, &user.claims, request.into_inner()).await?;
    Ok(Json(MessageResponse::new("Password changed")))
}

/// Current user endpoint.
///
/// - **URL:** `/api/v1/auth/me`
/// - **Method:** `GET`
/// - **Authentication:** Access token
#[get("/auth/me")]
pub async fn me(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: AuthenticatedUser,
) -> Result<Json<MeResponse>, AuthError> {
    service::me(&db, ctx, &user.claims).await.map(Json)
}

/// Logout endpoint.
///
/// - **URL:** `/api/v1/auth/logout`
/// - **Method:** `POST`
/// - **Authentication:** Access token
///
/// Revokes the session the token belongs to. Tokens of that session stop
/// working immediately, even before they expire.
#[post("/auth/logout")]
pub async fn logout(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: AuthenticatedUser,
) -> Result<Json<MessageResponse>, AuthError> {
    service::logout(&db, ctx, user.session_id()).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

pub fn routes() -> Vec<Route> {
    routes![
        login,
        refresh_token,
        register,
        forgot_password,
        reset_password,
        change_password,
        me,
        logout
    ]
}
