//! Session registry: one row per logged-in device.
//!
//! A session is live while `revoked_at` is null. Revocation is terminal and
//! idempotent; a fresh login always creates a new row. Creation runs inside
//! a `BEGIN IMMEDIATE` transaction so the same-device replacement, the
//! company session-limit count and the insert happen under one write lock.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use uuid::Uuid;

use crate::auth::{AuthError, SessionLimitPolicy};
use crate::models::{DeviceSession, NewDeviceSession, RevokeReason};
use crate::orm::company_setting::get_session_limit;
use crate::schema::device_sessions;

/// Everything needed to open a session for one device.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub user_id: i32,
    pub device_id: String,
    pub device_name: Option<String>,
    pub company_id: Option<i32>,
}

/// Opens a session for `(user, device)`, replacing any live one.
///
/// Replacing a session on the same device never counts against the company
/// limit. A new device is admitted only while the company has fewer live
/// sessions than its limit; otherwise `policy` decides between rejecting
/// with `SessionLimitExceeded` and evicting the least recently seen
/// sessions.
pub fn create_or_replace_session(
    conn: &mut SqliteConnection,
    request: &SessionRequest,
    policy: SessionLimitPolicy,
) -> Result<DeviceSession, AuthError> {
    conn.immediate_transaction(|conn| {
        let now = Utc::now().naive_utc();

        let replaced = diesel::update(
            device_sessions::table
                .filter(device_sessions::user_id.eq(request.user_id))
                .filter(device_sessions::device_id.eq(&request.device_id))
                .filter(device_sessions::revoked_at.is_null()),
        )
        .set((
            device_sessions::revoked_at.eq(Some(now)),
            device_sessions::revoked_reason.eq(Some(RevokeReason::Replaced.as_str())),
        ))
        .execute(conn)?;

        if replaced == 0 {
            if let Some(company_id) = request.company_id {
                make_room(conn, company_id, policy, now)?;
            }
        }

        let session_id = Uuid::new_v4().to_string();
        diesel::insert_into(device_sessions::table)
            .values(&NewDeviceSession {
                session_id: session_id.clone(),
                user_id: request.user_id,
                device_id: request.device_id.clone(),
                device_name: request.device_name.clone(),
                company_id: request.company_id,
                created_at: now,
                last_seen_at: now,
            })
            .execute(conn)?;

        let session = device_sessions::table
            .find(&session_id)
            .first::<DeviceSession>(conn)?;
        Ok(session)
    })
}

fn make_room(
    conn: &mut SqliteConnection,
    company_id: i32,
    policy: SessionLimitPolicy,
    now: NaiveDateTime,
) -> Result<(), AuthError> {
    let limit = match get_session_limit(conn, company_id)? {
        Some(limit) if limit > 0 => limit,
        _ => return Ok(()),
    };

    let live = count_live_for_company(conn, company_id)?;
    if live < limit {
        return Ok(());
    }

    match policy {
        SessionLimitPolicy::Reject => Err(AuthError::SessionLimitExceeded),
        SessionLimitPolicy::EvictOldest => {
            let victims: Vec<String> = device_sessions::table
                .filter(device_sessions::company_id.eq(company_id))
                .filter(device_sessions::revoked_at.is_null())
                .order(device_sessions::last_seen_at.asc())
                .limit(live - limit + 1)
                .select(device_sessions::session_id)
                .load(conn)?;

            diesel::update(
                device_sessions::table.filter(device_sessions::session_id.eq_any(&victims)),
            )
            .set((
                device_sessions::revoked_at.eq(Some(now)),
                device_sessions::revoked_reason.eq(Some(RevokeReason::Evicted.as_str())),
            ))
            .execute(conn)?;

            info!(
                "Evicted {} session(s) of company {} to honour its limit of {}",
                victims.len(),
                company_id,
                limit
            );
            Ok(())
        }
    }
}

/// True iff the session exists and has not been revoked.
pub fn is_live(conn: &mut SqliteConnection, session_id: &str) -> Result<bool, DieselError> {
    diesel::select(exists(
        device_sessions::table
            .filter(device_sessions::session_id.eq(session_id))
            .filter(device_sessions::revoked_at.is_null()),
    ))
    .get_result(conn)
}

/// Bumps `last_seen_at` if it is older than `min_interval`.
///
/// Returns whether a row was written. Revoked sessions are left alone.
pub fn touch(
    conn: &mut SqliteConnection,
    session_id: &str,
    min_interval: Duration,
) -> Result<bool, DieselError> {
    let now = Utc::now().naive_utc();
    let updated = diesel::update(
        device_sessions::table
            .filter(device_sessions::session_id.eq(session_id))
            .filter(device_sessions::revoked_at.is_null())
            .filter(device_sessions::last_seen_at.le(now - min_interval)),
    )
    .set(device_sessions::last_seen_at.eq(now))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Revokes one session. Returns false when it was unknown or already revoked.
pub fn revoke(
    conn: &mut SqliteConnection,
    session_id: &str,
    reason: RevokeReason,
) -> Result<bool, DieselError> {
    let updated = diesel::update(
        device_sessions::table
            .filter(device_sessions::session_id.eq(session_id))
            .filter(device_sessions::revoked_at.is_null()),
    )
    .set((
        device_sessions::revoked_at.eq(Some(Utc::now().naive_utc())),
        device_sessions::revoked_reason.eq(Some(reason.as_str())),
    ))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Revokes every live session of a user, optionally sparing one.
pub fn revoke_all_for_user(
    conn: &mut SqliteConnection,
    user_id: i32,
    reason: RevokeReason,
    except: Option<&str>,
) -> Result<usize, DieselError> {
    let now = Utc::now().naive_utc();
    let live = device_sessions::table
        .filter(device_sessions::user_id.eq(user_id))
        .filter(device_sessions::revoked_at.is_null());

    match except {
        Some(keep) => diesel::update(live.filter(device_sessions::session_id.ne(keep)))
            .set((
                device_sessions::revoked_at.eq(Some(now)),
                device_sessions::revoked_reason.eq(Some(reason.as_str())),
            ))
            .execute(conn),
        None => diesel::update(live)
            .set((
                device_sessions::revoked_at.eq(Some(now)),
                device_sessions::revoked_reason.eq(Some(reason.as_str())),
            ))
            .execute(conn),
    }
}

pub fn get_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> Result<Option<DeviceSession>, DieselError> {
    device_sessions::table
        .find(session_id)
        .first::<DeviceSession>(conn)
        .optional()
}

/// Live sessions of one user, most recently seen first.
pub fn list_live_for_user(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Vec<DeviceSession>, DieselError> {
    device_sessions::table
        .filter(device_sessions::user_id.eq(user_id))
        .filter(device_sessions::revoked_at.is_null())
        .order(device_sessions::last_seen_at.desc())
        .load(conn)
}

/// Live sessions of a whole company, most recently seen first.
pub fn list_live_for_company(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<Vec<DeviceSession>, DieselError> {
    device_sessions::table
        .filter(device_sessions::company_id.eq(company_id))
        .filter(device_sessions::revoked_at.is_null())
        .order(device_sessions::last_seen_at.desc())
        .load(conn)
}

pub fn count_live_for_company(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<i64, DieselError> {
    device_sessions::table
        .filter(device_sessions::company_id.eq(company_id))
        .filter(device_sessions::revoked_at.is_null())
        .count()
        .get_result(conn)
}

/// Moves a user's live sessions onto a company they just joined.
pub fn assign_company(
    conn: &mut SqliteConnection,
    user_id: i32,
    company_id: i32,
) -> Result<usize, DieselError> {
    diesel::update(
        device_sessions::table
            .filter(device_sessions::user_id.eq(user_id))
            .filter(device_sessions::revoked_at.is_null()),
    )
    .set(device_sessions::company_id.eq(Some(company_id)))
    .execute(conn)
}
