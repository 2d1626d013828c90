//! Login, refresh and password flows.
//!
//! Every function takes the store through [`DbRunner`] and the shared
//! [`AuthContext`], so the same code runs behind Rocket routes and in unit
//! tests over [`FakeDbConn`](crate::orm::testing::FakeDbConn). Store access
//! always goes through [`run_store`] and is bounded by the configured
//! store timeout.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rocket::tokio::task::spawn_blocking;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::context::AuthContext;
use super::error::AuthError;
use super::token::{ClaimSet, Claims, TokenKind};
use super::ADMIN_ROLE;
use crate::models::{Company, Location, RevokeReason, User, UserInput};
use crate::orm::company::{get_company_by_id, get_location, insert_company};
use crate::orm::company_setting::get_device_control;
use crate::orm::credentials::{
    LoginIdentifier, burn_verification, find_user_by_identifier, hash_password, verify_password,
};
use crate::orm::device_session::{
    SessionRequest, create_or_replace_session, is_live, revoke, revoke_all_for_user,
};
use crate::orm::password_reset::{
    consume_reset_token, digest_reset_secret, generate_reset_secret, store_reset_token,
};
use crate::orm::role::get_role_by_name;
use crate::orm::user::{
    assign_company, get_user, get_user_by_email, identifier_taken, insert_user, record_login,
    update_password_hash,
};
use crate::orm::user_preference::get_preferences;
use crate::orm::{DbRunner, device_session, run_store};

/// Login request body. Either `username` or `email` identifies the account.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Location to work in; defaults to the user's own location.
    #[serde(default)]
    pub location_id: Option<i32>,
    #[serde(default)]
    pub include_preferences: bool,
}

/// User fields safe to hand to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_id: Option<i32>,
    pub location_id: Option<i32>,
    pub role_id: Option<i32>,
    pub is_active: bool,
    #[ts(type = "string | null")]
    pub last_login: Option<NaiveDateTime>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            company_id: user.company_id,
            location_id: user.location_id,
            role_id: user.role_id,
            is_active: user.is_active,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub user: UserProfile,
    pub company: Option<Company>,
    pub location_id: Option<i32>,
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MeResponse {
    pub user: UserProfile,
    pub session_id: String,
    pub company: Option<Company>,
    pub location: Option<Location>,
    pub permissions: Vec<String>,
}

/// Runs password hashing or verification off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(work).await.map_err(|e| {
        error!("Password worker failed: {}", e);
        AuthError::Internal
    })
}

async fn hash_new_password(ctx: &AuthContext, password: String) -> Result<String, AuthError> {
    if password.chars().count() < ctx.config.min_password_length {
        return Err(AuthError::bad_request(format!(
            "Password must be at least {} characters",
            ctx.config.min_password_length
        )));
    }
    blocking(move || hash_password(&password))
        .await?
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            AuthError::Internal
        })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Authenticates a user on one device and opens a session for it.
///
/// Every authentication failure, whether unknown account, wrong password,
/// or an inactive or locked account, is reported as `InvalidCredentials`
/// after the same amount of hashing work.
pub async fn login<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    request: LoginRequest,
) -> Result<LoginResponse, AuthError> {
    let identifier = non_empty(request.username.as_deref())
        .map(LoginIdentifier::Username)
        .or_else(|| non_empty(request.email.as_deref()).map(LoginIdentifier::Email))
        .ok_or_else(|| AuthError::bad_request("Username or email is required"))?;
    if request.password.is_empty() {
        return Err(AuthError::bad_request("Password is required"));
    }
    let device_id = non_empty(Some(&request.device_id))
        .ok_or_else(|| AuthError::bad_request("device_id is required"))?;

    let timeout = ctx.config.store_timeout();
    let lookup = identifier.clone();
    let found = run_store(db, timeout, move |conn| {
        find_user_by_identifier(conn, &lookup)
    })
    .await?;

    let password = request.password;
    let (user, verified) = blocking(move || match found {
        Some(user) => {
            let ok = verify_password(&password, &user.password_hash);
            (Some(user), ok)
        }
        None => {
            burn_verification(&password);
            (None, false)
        }
    })
    .await?;

    let user = match user {
        Some(user) if verified && user.can_sign_in() => user,
        _ => {
            warn!("Failed login attempt for '{}'", identifier.as_str());
            return Err(AuthError::InvalidCredentials);
        }
    };

    let session_request = SessionRequest {
        user_id: user.id,
        device_id: device_id.clone(),
        device_name: non_empty(request.device_name.as_deref()),
        company_id: user.company_id,
    };
    let policy = ctx.config.session_limit_policy;
    let requested_location = request.location_id;
    let company_id = user.company_id;
    let default_location = user.location_id;
    let user_id = user.id;

    let (session, company, location_id) = run_store(db, timeout, move |conn| -> Result<_, AuthError> {
        let location_id = match requested_location {
            Some(location_id) => {
                let location = get_location(conn, location_id)?;
                match (location, company_id) {
                    (Some(location), Some(company_id)) if location.company_id == company_id => {
                        Some(location.id)
                    }
                    _ => {
                        return Err(AuthError::forbidden(
                            "location does not belong to your company",
                        ));
                    }
                }
            }
            None => default_location,
        };

        let company = match company_id {
            Some(company_id) => {
                let control = get_device_control(conn, company_id)?;
                if !control.permits(&session_request.device_id) {
                    return Err(AuthError::forbidden("device is not allowed for this company"));
                }
                get_company_by_id(conn, company_id)?
            }
            None => None,
        };

        let session = create_or_replace_session(conn, &session_request, policy)?;
        if let Err(e) = record_login(conn, user_id) {
            warn!("Could not record last login for user {}: {:?}", user_id, e);
        }
        Ok((session, company, location_id))
    })
    .await?;

    let identity = ClaimSet {
        session_id: session.session_id.clone(),
        user_id: user.id,
        company_id: user.company_id,
        location_id,
        role_id: user.role_id,
        email: user.email.clone(),
    };
    let access_token = ctx.codec.issue(&identity, TokenKind::Access)?;
    let refresh_token = ctx.codec.issue(&identity, TokenKind::Refresh)?;

    let permissions = match user.role_id {
        Some(role_id) => ctx
            .resolver
            .permissions_for_role(db, role_id)
            .await?
            .into_iter()
            .collect(),
        None => Vec::new(),
    };

    let preferences = if request.include_preferences {
        Some(run_store(db, timeout, move |conn| get_preferences(conn, user_id)).await?)
    } else {
        None
    };

    info!(
        "User {} logged in on device '{}' (session {})",
        user.id, device_id, session.session_id
    );

    Ok(LoginResponse {
        access_token,
        refresh_token,
        session_id: session.session_id,
        user: UserProfile::from(&user),
        company,
        location_id,
        permissions,
        preferences,
    })
}

/// Issues a new access token for a live session.
///
/// Company and role are re-read from the user record, so changes made since
/// login show up here. The location survives only while the company is
/// unchanged.
pub async fn refresh<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    refresh_token: &str,
) -> Result<RefreshResponse, AuthError> {
    let claims = ctx.codec.verify_kind(refresh_token, TokenKind::Refresh)?;

    let session_id = claims.identity.session_id.clone();
    let user_id = claims.identity.user_id;
    let (live, user) = run_store(db, ctx.config.store_timeout(), move |conn| {
        let live = is_live(conn, &session_id)?;
        let user = get_user(conn, user_id)?;
        Ok::<_, diesel::result::Error>((live, user))
    })
    .await?;

    if !live {
        debug!("Refresh refused: session {} is not live", claims.identity.session_id);
        return Err(AuthError::TokenExpiredOrInvalid);
    }
    let user = match user {
        Some(user) if user.can_sign_in() => user,
        _ => return Err(AuthError::TokenExpiredOrInvalid),
    };

    let location_id = if user.company_id == claims.identity.company_id {
        claims.identity.location_id
    } else {
        user.location_id
    };

    let identity = ClaimSet {
        session_id: claims.identity.session_id,
        user_id: user.id,
        company_id: user.company_id,
        location_id,
        role_id: user.role_id,
        email: user.email,
    };
    Ok(RefreshResponse {
        access_token: ctx.codec.issue(&identity, TokenKind::Access)?,
    })
}

/// Revokes the caller's session. Revoking twice is not an error.
pub async fn logout<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    session_id: &str,
) -> Result<(), AuthError> {
    let id = session_id.to_string();
    let revoked = run_store(db, ctx.config.store_timeout(), move |conn| {
        revoke(conn, &id, RevokeReason::Logout)
    })
    .await?;
    if revoked {
        info!("Session {} logged out", session_id);
    }
    Ok(())
}

/// Issues a reset secret if `email` belongs to an active account.
///
/// The outcome is the same whether or not the account exists.
pub async fn forgot_password<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    email: &str,
) -> Result<(), AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::bad_request("Email is required"));
    }

    let secret = generate_reset_secret();
    let digest = digest_reset_secret(&secret);
    let ttl = ctx.config.reset_token_ttl();
    let lookup = email.clone();

    let issued = run_store(db, ctx.config.store_timeout(), move |conn| {
        match get_user_by_email(conn, &lookup)? {
            Some(user) if user.is_active => {
                store_reset_token(conn, user.id, &digest, ttl)?;
                Ok::<_, diesel::result::Error>(true)
            }
            _ => Ok(false),
        }
    })
    .await?;

    if issued {
        ctx.notifier.send_reset(&email, &secret);
    } else {
        debug!("Password reset requested for unknown or inactive account");
    }
    Ok(())
}

/// Consumes a reset secret, sets the new password and signs the user out
/// everywhere, all in one transaction.
pub async fn reset_password<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    request: ResetPasswordRequest,
) -> Result<(), AuthError> {
    if request.token.trim().is_empty() {
        return Err(AuthError::bad_request("Token is required"));
    }
    let new_hash = hash_new_password(ctx, request.new_password).await?;
    let digest = digest_reset_secret(request.token.trim());

    let (user_id, revoked) = run_store(db, ctx.config.store_timeout(), move |conn| {
        conn.immediate_transaction(|conn| -> Result<_, AuthError> {
            let user_id = consume_reset_token(conn, &digest)?;
            update_password_hash(conn, user_id, &new_hash)?;
            let revoked = revoke_all_for_user(conn, user_id, RevokeReason::PasswordReset, None)?;
            Ok((user_id, revoked))
        })
    })
    .await?;

    info!(
        "Password reset for user {}; {} session(s) revoked",
        user_id, revoked
    );
    Ok(())
}

/// Changes the caller's password after checking the current one.
///
/// When so configured, every other session of the user is revoked; the
/// session making the call stays live.
pub async fn change_password<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    claims: &Claims,
    request: ChangePasswordRequest,
) -> Result<(), AuthError> {
    let timeout = ctx.config.store_timeout();
    let user_id = claims.identity.user_id;

    let user = run_store(db, timeout, move |conn| get_user(conn, user_id))
        .await?
        .ok_or_else(|| AuthError::not_found("User"))?;

    let current = request.current_password;
    let stored = user.password_hash.clone();
    if !blocking(move || verify_password(&current, &stored)).await? {
        return Err(AuthError::InvalidCredentials);
    }

    let new_hash = hash_new_password(ctx, request.new_password).await?;
    let keep = claims.identity.session_id.clone();
    let revoke_others = ctx.config.revoke_other_sessions_on_password_change;

    let revoked = run_store(db, timeout, move |conn| {
        conn.immediate_transaction(|conn| {
            update_password_hash(conn, user_id, &new_hash)?;
            if revoke_others {
                revoke_all_for_user(conn, user_id, RevokeReason::PasswordChange, Some(&keep))
            } else {
                Ok(0)
            }
        })
    })
    .await?;

    info!(
        "Password changed for user {}; {} other session(s) revoked",
        user_id, revoked
    );
    Ok(())
}

/// Creates an account with no company and no role.
pub async fn register<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    request: RegisterRequest,
) -> Result<UserProfile, AuthError> {
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();
    let username_len = username.chars().count();
    if !(3..=50).contains(&username_len) {
        return Err(AuthError::bad_request(
            "Username must be between 3 and 50 characters",
        ));
    }
    if username.contains('@') {
        return Err(AuthError::bad_request("Username may not contain '@'"));
    }
    if !email.contains('@') {
        return Err(AuthError::bad_request("A valid email is required"));
    }

    let timeout = ctx.config.store_timeout();
    let (check_name, check_email) = (username.clone(), email.clone());
    let taken = run_store(db, timeout, move |conn| {
        identifier_taken(conn, &check_name, &check_email)
    })
    .await?;
    if taken {
        return Err(AuthError::conflict("Username or email already registered"));
    }

    let password_hash = hash_new_password(ctx, request.password).await?;
    let input = UserInput {
        username,
        email,
        password_hash,
        first_name: non_empty(request.first_name.as_deref()),
        last_name: non_empty(request.last_name.as_deref()),
        ..UserInput::default()
    };

    let user = run_store(db, timeout, move |conn| insert_user(conn, input))
        .await
        .map_err(|e| match e {
            AuthError::Conflict(_) => AuthError::conflict("Username or email already registered"),
            other => other,
        })?;

    info!("Registered user {} ('{}')", user.id, user.username);
    Ok(UserProfile::from(&user))
}

type Profile = (User, Option<Company>, Option<Location>);

fn load_profile(
    conn: &mut diesel::SqliteConnection,
    user_id: i32,
    location_id: Option<i32>,
) -> Result<Option<Profile>, diesel::result::Error> {
    let Some(user) = get_user(conn, user_id)? else {
        return Ok(None);
    };
    let company = match user.company_id {
        Some(company_id) => get_company_by_id(conn, company_id)?,
        None => None,
    };
    let location = match location_id {
        Some(location_id) => get_location(conn, location_id)?,
        None => None,
    };
    Ok(Some((user, company, location)))
}

/// The caller's account as seen through their token's session.
pub async fn me<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    claims: &Claims,
) -> Result<MeResponse, AuthError> {
    let user_id = claims.identity.user_id;
    let location_id = claims.identity.location_id;

    let loaded = run_store(db, ctx.config.store_timeout(), move |conn| {
        load_profile(conn, user_id, location_id)
    })
    .await?;
    let (user, company, location) = loaded.ok_or_else(|| AuthError::not_found("User"))?;

    let permissions = match user.role_id {
        Some(role_id) => ctx
            .resolver
            .permissions_for_role(db, role_id)
            .await?
            .into_iter()
            .collect(),
        None => Vec::new(),
    };

    Ok(MeResponse {
        user: UserProfile::from(&user),
        session_id: claims.identity.session_id.clone(),
        company,
        location,
        permissions,
    })
}

/// Creates a company and makes the caller its administrator.
///
/// Only a user without a company may do this. Tokens are not reissued; the
/// caller picks up the new company on the next refresh.
pub async fn create_company<D: DbRunner>(
    db: &D,
    ctx: &AuthContext,
    user_id: i32,
    name: &str,
) -> Result<Company, AuthError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AuthError::bad_request("Company name is required"));
    }

    let company = run_store(db, ctx.config.store_timeout(), move |conn| {
        conn.immediate_transaction(|conn| -> Result<Company, AuthError> {
            let user = get_user(conn, user_id)?.ok_or_else(|| AuthError::not_found("User"))?;
            if user.company_id.is_some() {
                return Err(AuthError::conflict("User already belongs to a company"));
            }
            let admin = get_role_by_name(conn, ADMIN_ROLE)?.ok_or_else(|| {
                error!("Role '{}' is missing from the store", ADMIN_ROLE);
                AuthError::Internal
            })?;

            let company = insert_company(conn, &name).map_err(|e| match AuthError::from(e) {
                AuthError::Conflict(_) => AuthError::conflict("Company name already taken"),
                other => other,
            })?;
            assign_company(conn, user_id, company.id, admin.id, None)?;
            device_session::assign_company(conn, user_id, company.id)?;
            Ok(company)
        })
    })
    .await?;

    info!(
        "User {} created company {} ('{}')",
        user_id, company.id, company.name
    );
    Ok(company)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use diesel::{ExpressionMethods, QueryDsl, RunQueryDsl};

    use super::*;
    use crate::auth::config::AuthConfig;
    use crate::auth::notifier::RecordingNotifier;
    use crate::models::DeviceControl;
    use crate::orm::company::get_company_by_name;
    use crate::orm::company_setting::{set_device_control, set_session_limit};
    use crate::orm::device_session::{get_session, list_live_for_user};
    use crate::orm::testing::{
        ACME, FakeDbConn, TEST_JWT_SECRET, TEST_PASSWORD, seed_test_data, seeded_email,
        seeded_user, setup_test_db, setup_test_dbconn,
    };
    use crate::schema::users;

    fn context(notifier: Arc<RecordingNotifier>) -> AuthContext {
        let config = AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            ..AuthConfig::default()
        };
        AuthContext::new(config, notifier).unwrap()
    }

    fn seeded() -> FakeDbConn {
        let mut conn = setup_test_db();
        seed_test_data(&mut conn).unwrap();
        setup_test_dbconn(conn)
    }

    fn login_as(username: &str, device: &str) -> LoginRequest {
        LoginRequest {
            username: Some(username.to_string()),
            password: TEST_PASSWORD.to_string(),
            device_id: device.to_string(),
            ..LoginRequest::default()
        }
    }

    #[rocket::async_test]
    async fn test_login_mints_tokens_for_user() {
        let db = seeded();
        let ctx = context(Arc::default());

        let response = login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();
        let claims = ctx.codec.verify_kind(&response.access_token, TokenKind::Access).unwrap();

        assert_eq!(claims.identity.user_id, response.user.id);
        assert_eq!(claims.identity.session_id, response.session_id);
        assert_eq!(claims.identity.company_id, response.user.company_id);
        assert_eq!(response.permissions, vec!["CREATE_SALES".to_string()]);
        assert_eq!(response.company.map(|c| c.name), Some(ACME.to_string()));
        assert!(ctx.codec.verify_kind(&response.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[rocket::async_test]
    async fn test_login_by_email_any_case() {
        let db = seeded();
        let ctx = context(Arc::default());

        let request = LoginRequest {
            email: Some(seeded_email("acme_manager").to_uppercase()),
            password: TEST_PASSWORD.to_string(),
            device_id: "tablet".to_string(),
            ..LoginRequest::default()
        };
        assert!(login(&db, &ctx, request).await.is_ok());
    }

    #[rocket::async_test]
    async fn test_login_failures_are_indistinguishable() {
        let db = seeded();
        let ctx = context(Arc::default());

        let mut wrong_password = login_as("acme_cashier", "till-1");
        wrong_password.password = "nope".to_string();
        let unknown = login_as("nobody", "till-1");
        let locked = login_as("locked_user", "till-1");

        for request in [wrong_password, unknown, locked] {
            assert_eq!(
                login(&db, &ctx, request).await.unwrap_err(),
                AuthError::InvalidCredentials
            );
        }
    }

    #[rocket::async_test]
    async fn test_login_requires_device_id() {
        let db = seeded();
        let ctx = context(Arc::default());

        let err = login(&db, &ctx, login_as("acme_cashier", "  ")).await.unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
    }

    #[rocket::async_test]
    async fn test_login_without_company_has_empty_tenant_claims() {
        let db = seeded();
        let ctx = context(Arc::default());

        let response = login(&db, &ctx, login_as("newbie", "phone")).await.unwrap();
        let claims = ctx.codec.verify(&response.access_token).unwrap();
        assert_eq!(claims.identity.company_id, None);
        assert_eq!(claims.identity.role_id, None);
        assert!(response.permissions.is_empty());
    }

    #[rocket::async_test]
    async fn test_login_rejects_foreign_location() {
        let db = seeded();
        let ctx = context(Arc::default());
        let globex_admin = db.run(|c| seeded_user(c, "globex_admin")).await;

        let mut request = login_as("acme_cashier", "till-1");
        request.location_id = globex_admin.location_id;
        assert!(matches!(
            login(&db, &ctx, request).await.unwrap_err(),
            AuthError::Forbidden(_)
        ));
    }

    #[rocket::async_test]
    async fn test_device_control_blocks_unlisted_device() {
        let db = seeded();
        let ctx = context(Arc::default());
        db.run(|c| {
            let acme = get_company_by_name(c, ACME).unwrap().unwrap();
            set_device_control(
                c,
                acme.id,
                &DeviceControl {
                    restrict_devices: true,
                    allowed_device_ids: vec!["till-1".to_string()],
                },
            )
            .unwrap();
        })
        .await;

        assert!(login(&db, &ctx, login_as("acme_cashier", "till-1")).await.is_ok());
        assert!(matches!(
            login(&db, &ctx, login_as("acme_cashier", "till-2")).await.unwrap_err(),
            AuthError::Forbidden(_)
        ));
    }

    #[rocket::async_test]
    async fn test_session_limit_rejects_extra_device() {
        let db = seeded();
        let ctx = context(Arc::default());
        db.run(|c| {
            let acme = get_company_by_name(c, ACME).unwrap().unwrap();
            set_session_limit(c, acme.id, 1).unwrap();
        })
        .await;

        login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();
        // Same device again is a replacement, not a new slot.
        login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();
        assert_eq!(
            login(&db, &ctx, login_as("acme_manager", "office")).await.unwrap_err(),
            AuthError::SessionLimitExceeded
        );
    }

    #[rocket::async_test]
    async fn test_refresh_picks_up_new_role() {
        let db = seeded();
        let ctx = context(Arc::default());
        let response = login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();
        let user_id = response.user.id;

        let manager_role = db
            .run(move |c| {
                let role = get_role_by_name(c, "Manager").unwrap().unwrap();
                diesel::update(users::table.find(user_id))
                    .set(users::role_id.eq(Some(role.id)))
                    .execute(c)
                    .unwrap();
                role.id
            })
            .await;

        let refreshed = refresh(&db, &ctx, &response.refresh_token).await.unwrap();
        let claims = ctx.codec.verify(&refreshed.access_token).unwrap();
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.identity.role_id, Some(manager_role));
        assert_eq!(claims.identity.session_id, response.session_id);
        assert_eq!(claims.identity.location_id, response.location_id);
    }

    #[rocket::async_test]
    async fn test_refresh_rejects_access_token_and_dead_session() {
        let db = seeded();
        let ctx = context(Arc::default());
        let response = login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();

        assert_eq!(
            refresh(&db, &ctx, &response.access_token).await.unwrap_err(),
            AuthError::TokenExpiredOrInvalid
        );

        logout(&db, &ctx, &response.session_id).await.unwrap();
        assert_eq!(
            refresh(&db, &ctx, &response.refresh_token).await.unwrap_err(),
            AuthError::TokenExpiredOrInvalid
        );
    }

    #[rocket::async_test]
    async fn test_logout_is_idempotent() {
        let db = seeded();
        let ctx = context(Arc::default());
        let response = login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();

        logout(&db, &ctx, &response.session_id).await.unwrap();
        logout(&db, &ctx, &response.session_id).await.unwrap();
        logout(&db, &ctx, "no-such-session").await.unwrap();

        let id = response.session_id.clone();
        let session = db.run(move |c| get_session(c, &id).unwrap().unwrap()).await;
        assert_eq!(session.revoked_reason.as_deref(), Some("logout"));
    }

    #[rocket::async_test]
    async fn test_forgot_password_only_notifies_real_accounts() {
        let db = seeded();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(notifier.clone());

        forgot_password(&db, &ctx, "ghost@example.test").await.unwrap();
        assert_eq!(notifier.count(), 0);

        forgot_password(&db, &ctx, &seeded_email("acme_cashier")).await.unwrap();
        assert_eq!(notifier.count(), 1);
        assert!(notifier.last_secret_for(&seeded_email("acme_cashier")).is_some());
    }

    #[rocket::async_test]
    async fn test_reset_password_consumes_once_and_signs_out() {
        let db = seeded();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(notifier.clone());
        let email = seeded_email("acme_cashier");

        let first = login(&db, &ctx, login_as("acme_cashier", "till-1")).await.unwrap();
        let second = login(&db, &ctx, login_as("acme_cashier", "till-2")).await.unwrap();

        forgot_password(&db, &ctx, &email).await.unwrap();
        let secret = notifier.last_secret_for(&email).unwrap();
        let reset = ResetPasswordRequest {
            token: secret.clone(),
            new_password: "brand-new-pass".to_string(),
        };

        reset_password(&db, &ctx, reset.clone()).await.unwrap();
        assert_eq!(
            reset_password(&db, &ctx, reset).await.unwrap_err(),
            AuthError::TokenAlreadyUsed
        );

        let user_id = first.user.id;
        let live = db.run(move |c| list_live_for_user(c, user_id).unwrap()).await;
        assert!(live.is_empty());
        for session in [first.session_id, second.session_id] {
            let session = db.run(move |c| get_session(c, &session).unwrap().unwrap()).await;
            assert_eq!(session.revoked_reason.as_deref(), Some("password_reset"));
        }

        let mut with_new = login_as("acme_cashier", "till-1");
        with_new.password = "brand-new-pass".to_string();
        assert!(login(&db, &ctx, with_new).await.is_ok());
    }

    #[rocket::async_test]
    async fn test_reset_with_unknown_token_is_not_found() {
        let db = seeded();
        let ctx = context(Arc::default());
        let err = reset_password(
            &db,
            &ctx,
            ResetPasswordRequest {
                token: "f00d".to_string(),
                new_password: "brand-new-pass".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[rocket::async_test]
    async fn test_change_password_keeps_calling_session() {
        let db = seeded();
        let ctx = context(Arc::default());
        let here = login(&db, &ctx, login_as("acme_manager", "laptop")).await.unwrap();
        let other = login(&db, &ctx, login_as("acme_manager", "phone")).await.unwrap();
        let claims = ctx.codec.verify(&here.access_token).unwrap();

        let wrong = ChangePasswordRequest {
            current_password: "not-it".to_string(),
            new_password: "another-pass".to_string(),
        };
        assert_eq!(
            change_password(&db, &ctx, &claims, wrong).await.unwrap_err(),
            AuthError::InvalidCredentials
        );

        let request = ChangePasswordRequest {
            current_password: TEST_PASSWORD.to_string(),
            new_password: "another-pass".to_string(),
        };
        change_password(&db, &ctx, &claims, request).await.unwrap();

        let (here_id, other_id) = (here.session_id.clone(), other.session_id.clone());
        let (here_live, other_live) = db
            .run(move |c| (is_live(c, &here_id).unwrap(), is_live(c, &other_id).unwrap()))
            .await;
        assert!(here_live);
        assert!(!other_live);
    }

    #[rocket::async_test]
    async fn test_register_then_create_company() {
        let db = seeded();
        let ctx = context(Arc::default());
        let request = RegisterRequest {
            username: "founder".to_string(),
            email: "Founder@Example.test".to_string(),
            password: "founder-pass".to_string(),
            first_name: Some("Fay".to_string()),
            last_name: None,
        };

        let profile = register(&db, &ctx, request.clone()).await.unwrap();
        assert_eq!(profile.email, "founder@example.test");
        assert_eq!(profile.company_id, None);
        assert!(matches!(
            register(&db, &ctx, request).await.unwrap_err(),
            AuthError::Conflict(_)
        ));

        let company = create_company(&db, &ctx, profile.id, "Founder Foods").await.unwrap();
        assert!(matches!(
            create_company(&db, &ctx, profile.id, "Second Try").await.unwrap_err(),
            AuthError::Conflict(_)
        ));

        let user_id = profile.id;
        let user = db.run(move |c| get_user(c, user_id).unwrap().unwrap()).await;
        assert_eq!(user.company_id, Some(company.id));
        assert!(user.role_id.is_some());
    }

    #[rocket::async_test]
    async fn test_register_rejects_short_password() {
        let db = seeded();
        let ctx = context(Arc::default());
        let err = register(
            &db,
            &ctx,
            RegisterRequest {
                username: "shorty".to_string(),
                email: "shorty@example.test".to_string(),
                password: "123".to_string(),
                first_name: None,
                last_name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
    }
}
