//! Device session endpoints.

use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::MessageResponse;
use crate::auth::{AuthContext, AuthError, VIEW_SESSIONS};
use crate::models::{DeviceSession, RevokeReason};
use crate::orm::device_session::{get_session, list_live_for_company, list_live_for_user, revoke};
use crate::orm::{DbConn, run_store};
use crate::session_guards::{AccessRequirements, CompanyUser, SessionManager};

/// A live session, flagged when it is the caller's own.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeviceSessionView {
    #[serde(flatten)]
    pub session: DeviceSession,
    pub current: bool,
}

/// List Device Sessions endpoint.
///
/// - **URL:** `/api/v1/device-sessions`
/// - **Method:** `GET`
/// - **Authentication:** Access token of a company member
/// - **Authorization:** `?scope=company` additionally needs `VIEW_SESSIONS`
///
/// Without a scope the caller's own live sessions are listed; with
/// `scope=company` every live session of the caller's company is.
#[get("/device-sessions?<scope>")]
pub async fn list_sessions(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: CompanyUser,
    scope: Option<&str>,
) -> Result<Json<Vec<DeviceSessionView>>, AuthError> {
    let timeout = ctx.config.store_timeout();
    let company_id = user.company_id;

    let sessions = match scope {
        Some("company") => {
            AccessRequirements::new()
                .company(company_id)
                .permission(VIEW_SESSIONS)
                .enforce(&db, ctx, &user.user)
                .await?;
            run_store(&db, timeout, move |conn| list_live_for_company(conn, company_id)).await?
        }
        Some(other) => {
            return Err(AuthError::bad_request(format!("Unknown scope '{}'", other)));
        }
        None => {
            let user_id = user.user.user_id();
            run_store(&db, timeout, move |conn| list_live_for_user(conn, user_id))
                .await?
                .into_iter()
                .filter(|s| s.company_id == Some(company_id))
                .collect()
        }
    };

    let current = user.user.session_id();
    Ok(Json(
        sessions
            .into_iter()
            .map(|session| DeviceSessionView {
                current: session.session_id == current,
                session,
            })
            .collect(),
    ))
}

/// Revoke Device Session endpoint.
///
/// - **URL:** `/api/v1/device-sessions/<session_id>`
/// - **Method:** `DELETE`
/// - **Authorization:** `MANAGE_SESSIONS` in the session's company
///
/// Revoking an already revoked session succeeds. A session of another
/// company is 403, an unknown one 404.
#[delete("/device-sessions/<session_id>")]
pub async fn revoke_session(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: SessionManager,
    session_id: &str,
) -> Result<Json<MessageResponse>, AuthError> {
    let timeout = ctx.config.store_timeout();

    let id = session_id.to_string();
    let session = run_store(&db, timeout, move |conn| get_session(conn, &id))
        .await?
        .ok_or_else(|| AuthError::not_found("Session"))?;

    match session.company_id {
        Some(company_id) => {
            AccessRequirements::new()
                .company(company_id)
                .enforce(&db, ctx, &user.user)
                .await?
        }
        None => return Err(AuthError::forbidden("company mismatch")),
    }

    let id = session.session_id.clone();
    let revoked = run_store(&db, timeout, move |conn| revoke(conn, &id, RevokeReason::Admin)).await?;
    if revoked {
        info!(
            "User {} revoked session {} of user {}",
            user.user.user_id(),
            session.session_id,
            session.user_id
        );
    }
    Ok(Json(MessageResponse::new("Session revoked")))
}

pub fn routes() -> Vec<Route> {
    routes![list_sessions, revoke_session]
}
