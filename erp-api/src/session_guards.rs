//! Bearer-token authentication and authorization guards for Rocket routes.
//!
//! Each protected request goes through the same gate, stopping at the first
//! failing check:
//!
//! 1. `Authorization: Bearer <token>` must verify and be an access token
//! 2. the token's session must still be live
//! 3. the resource's company must equal the token's company, if required
//! 4. the token's role must hold the permission, if required
//! 5. the token's role must have the given name, if required
//!
//! Steps 1-2 are [`AuthenticatedUser`]. Step 3 for the caller's own company
//! is [`CompanyUser`]; for a company named by the request it is
//! [`AccessRequirements`]. Steps 4-5 are the macro-generated guards or
//! [`AccessRequirements`].
//!
//! # Basic Authentication
//!
//! ```rust
//! use rocket::get;
//! use erp_api::session_guards::AuthenticatedUser;
//!
//! #[get("/whoami")]
//! fn whoami(user: AuthenticatedUser) -> String {
//!     format!("user {} on session {}", user.user_id(), user.session_id())
//! }
//! ```
//!
//! # Permission-Based Authorization
//!
//! ```rust
//! use rocket::get;
//! use erp_api::session_guards::SessionManager;
//!
//! #[get("/sessions/manage")]
//! fn manage(user: SessionManager) -> String {
//!     format!("managing sessions of company {}", user.company_id)
//! }
//! ```
//!
//! # Resource-Scoped Checks
//!
//! ```rust,ignore
//! AccessRequirements::new()
//!     .company(body.company_id)
//!     .permission("CREATE_SALES")
//!     .enforce(&db, ctx, &user)
//!     .await?;
//! ```
//!
//! When a guard fails it stores its [`AuthError`] in request-local state as
//! a [`GuardFailure`]; the JSON catchers report that error's code.

use chrono::Duration;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

use crate::auth::{
    ADMIN_ROLE, AuthContext, AuthError, Claims, MANAGE_SESSIONS, MANAGE_SETTINGS, TokenKind,
    VIEW_SETTINGS, extract_bearer,
};
use crate::orm::device_session::{is_live, touch};
use crate::orm::{DbConn, DbRunner, run_store};

/// The error that stopped a guard, for the catchers to report.
#[derive(Debug, Default)]
pub struct GuardFailure(pub Option<AuthError>);

fn fail<T>(request: &Request<'_>, err: AuthError) -> request::Outcome<T, AuthError> {
    request.local_cache(|| GuardFailure(Some(err.clone())));
    Outcome::Error((err.status(), err))
}

fn auth_context<'r>(request: &'r Request<'_>) -> Result<&'r AuthContext, AuthError> {
    request.rocket().state::<AuthContext>().ok_or_else(|| {
        error!("AuthContext is not managed; is the auth fairing attached?");
        AuthError::Internal
    })
}

async fn db_conn(request: &Request<'_>) -> Result<DbConn, AuthError> {
    match request.guard::<DbConn>().await {
        Outcome::Success(db) => Ok(db),
        _ => {
            warn!("No database connection available for request guard");
            Err(AuthError::Unavailable)
        }
    }
}

async fn role_has_permission(
    request: &Request<'_>,
    role_id: Option<i32>,
    permission: &str,
) -> Result<bool, AuthError> {
    let ctx = auth_context(request)?;
    let db = db_conn(request).await?;
    ctx.resolver.has_permission(&db, role_id, permission).await
}

async fn role_is(request: &Request<'_>, role_id: Option<i32>, role: &str) -> Result<bool, AuthError> {
    let ctx = auth_context(request)?;
    let db = db_conn(request).await?;
    ctx.resolver.has_role(&db, role_id, role).await
}

/// A caller with a verified access token on a live session.
///
/// The token's claims are the caller's identity for the rest of the
/// request: company, location and role are read from them, not from the
/// store.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> i32 {
        self.claims.identity.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.claims.identity.session_id
    }

    pub fn company_id(&self) -> Option<i32> {
        self.claims.identity.company_id
    }

    pub fn location_id(&self) -> Option<i32> {
        self.claims.identity.location_id
    }

    pub fn role_id(&self) -> Option<i32> {
        self.claims.identity.role_id
    }

    pub fn email(&self) -> &str {
        &self.claims.identity.email
    }

    async fn authenticate(request: &Request<'_>) -> Result<AuthenticatedUser, AuthError> {
        let ctx = auth_context(request)?;

        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(extract_bearer)
            .ok_or(AuthError::TokenExpiredOrInvalid)?;
        let claims = ctx.codec.verify_kind(token, TokenKind::Access)?;

        let db = db_conn(request).await?;
        let timeout = ctx.config.store_timeout();
        let session_id = claims.identity.session_id.clone();
        let live = run_store(&db, timeout, move |conn| is_live(conn, &session_id)).await?;
        if !live {
            debug!("Rejected token for revoked session {}", claims.identity.session_id);
            return Err(AuthError::SessionRevoked);
        }

        spawn_touch(request, ctx, claims.identity.session_id.clone()).await;

        Ok(AuthenticatedUser { claims })
    }
}

/// Records activity on the session without holding up the request.
///
/// The update runs on its own pooled connection in a detached task, so a
/// writer holding the database lock delays only the touch.
async fn spawn_touch(request: &Request<'_>, ctx: &AuthContext, session_id: String) {
    let Some(db) = DbConn::get_one(request.rocket()).await else {
        warn!("No connection to touch session {}", session_id);
        return;
    };
    let timeout = ctx.config.store_timeout();
    let interval = Duration::seconds(ctx.config.session_touch_interval_secs);

    rocket::tokio::spawn(async move {
        let id = session_id.clone();
        if let Err(e) = run_store(&db, timeout, move |conn| touch(conn, &id, interval)).await {
            warn!("Could not touch session {}: {}", session_id, e);
        }
    });
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthError;

    /// Verifies the bearer token and the liveness of its session.
    ///
    /// The outcome is cached for the request, so stacked guards do the
    /// work once.
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let cached = request
            .local_cache_async(async { AuthenticatedUser::authenticate(request).await })
            .await;

        match cached {
            Ok(user) => Outcome::Success(user.clone()),
            Err(e) => fail(request, e.clone()),
        }
    }
}

/// An authenticated caller who belongs to a company.
#[derive(Debug, Clone)]
pub struct CompanyUser {
    pub user: AuthenticatedUser,
    pub company_id: i32,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CompanyUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let user = match AuthenticatedUser::from_request(request).await {
            Outcome::Success(user) => user,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        match user.company_id() {
            Some(company_id) => Outcome::Success(CompanyUser { user, company_id }),
            None => fail(request, AuthError::forbidden("company required")),
        }
    }
}

/// Macro to create permission-specific request guards.
///
/// The generated guard requires a company and that the caller's role holds
/// the permission.
macro_rules! create_permission_guard {
    ($name:ident, $permission:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            pub user: AuthenticatedUser,
            pub company_id: i32,
        }

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = AuthError;

            async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
                let company_user = match CompanyUser::from_request(request).await {
                    Outcome::Success(user) => user,
                    Outcome::Error(e) => return Outcome::Error(e),
                    Outcome::Forward(f) => return Outcome::Forward(f),
                };

                match role_has_permission(request, company_user.user.role_id(), $permission).await {
                    Ok(true) => Outcome::Success($name {
                        user: company_user.user,
                        company_id: company_user.company_id,
                    }),
                    Ok(false) => fail(
                        request,
                        AuthError::forbidden(format!("missing permission {}", $permission)),
                    ),
                    Err(e) => fail(request, e),
                }
            }
        }
    };
}

/// Macro to create role-specific request guards.
macro_rules! create_role_guard {
    ($name:ident, $role:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            pub user: AuthenticatedUser,
        }

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = AuthError;

            async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
                let user = match AuthenticatedUser::from_request(request).await {
                    Outcome::Success(user) => user,
                    Outcome::Error(e) => return Outcome::Error(e),
                    Outcome::Forward(f) => return Outcome::Forward(f),
                };

                match role_is(request, user.role_id(), $role).await {
                    Ok(true) => Outcome::Success($name { user }),
                    Ok(false) => fail(request, AuthError::forbidden(format!("role {} required", $role))),
                    Err(e) => fail(request, e),
                }
            }
        }
    };
}

// Company members who may revoke sessions of their company.
create_permission_guard!(SessionManager, MANAGE_SESSIONS);

create_permission_guard!(SettingsViewer, VIEW_SETTINGS);

create_permission_guard!(SettingsManager, MANAGE_SETTINGS);

// Holders of the "Admin" role, company or not.
create_role_guard!(AdminUser, ADMIN_ROLE);

/// Checks that depend on the resource being accessed.
///
/// Built per request and enforced against the caller's claims. Checks run
/// in a fixed order: company, location, permission, role. A company
/// mismatch is always an explicit `Forbidden`, never a silent narrowing to
/// the caller's own company.
#[derive(Debug, Clone, Default)]
pub struct AccessRequirements<'a> {
    company: Option<i32>,
    location: Option<i32>,
    permission: Option<&'a str>,
    role: Option<&'a str>,
}

impl<'a> AccessRequirements<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resource belongs to `company_id`.
    pub fn company(mut self, company_id: i32) -> Self {
        self.company = Some(company_id);
        self
    }

    /// The resource belongs to `location_id`.
    pub fn location(mut self, location_id: i32) -> Self {
        self.location = Some(location_id);
        self
    }

    pub fn permission(mut self, name: &'a str) -> Self {
        self.permission = Some(name);
        self
    }

    pub fn role(mut self, name: &'a str) -> Self {
        self.role = Some(name);
        self
    }

    pub async fn enforce<D: DbRunner>(
        &self,
        db: &D,
        ctx: &AuthContext,
        user: &AuthenticatedUser,
    ) -> Result<(), AuthError> {
        if let Some(company_id) = self.company {
            if user.company_id() != Some(company_id) {
                warn!(
                    "User {} (company {:?}) denied access to company {}",
                    user.user_id(),
                    user.company_id(),
                    company_id
                );
                return Err(AuthError::forbidden("company mismatch"));
            }
        }

        if let Some(location_id) = self.location {
            if user.location_id() != Some(location_id) {
                return Err(AuthError::forbidden("location mismatch"));
            }
        }

        if let Some(permission) = self.permission {
            if !ctx
                .resolver
                .has_permission(db, user.role_id(), permission)
                .await?
            {
                return Err(AuthError::forbidden(format!(
                    "missing permission {}",
                    permission
                )));
            }
        }

        if let Some(role) = self.role {
            if !ctx.resolver.has_role(db, user.role_id(), role).await? {
                return Err(AuthError::forbidden(format!("role {} required", role)));
            }
        }

        Ok(())
    }
}
