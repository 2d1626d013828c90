//! Per-company configuration consumed by the session registry.

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::Error as DieselError;

use crate::models::{DEVICE_CONTROL_KEY, DeviceControl, MAX_SESSIONS_KEY, NewCompanySetting};
use crate::schema::company_settings;

pub fn get_setting(
    conn: &mut SqliteConnection,
    company_id: i32,
    key: &str,
) -> Result<Option<String>, DieselError> {
    company_settings::table
        .filter(company_settings::company_id.eq(company_id))
        .filter(company_settings::key.eq(key))
        .select(company_settings::value)
        .first::<String>(conn)
        .optional()
}

/// Inserts or replaces one setting.
pub fn put_setting(
    conn: &mut SqliteConnection,
    company_id: i32,
    key: &str,
    value: &str,
) -> Result<(), DieselError> {
    let now = Utc::now().naive_utc();
    diesel::insert_into(company_settings::table)
        .values(&NewCompanySetting {
            company_id,
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now,
        })
        .on_conflict((company_settings::company_id, company_settings::key))
        .do_update()
        .set((
            company_settings::value.eq(value),
            company_settings::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

/// Returns true if a setting was removed.
pub fn delete_setting(
    conn: &mut SqliteConnection,
    company_id: i32,
    key: &str,
) -> Result<bool, DieselError> {
    let deleted = diesel::delete(
        company_settings::table
            .filter(company_settings::company_id.eq(company_id))
            .filter(company_settings::key.eq(key)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

/// The company's cap on live sessions. `None` means unlimited.
pub fn get_session_limit(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<Option<i64>, DieselError> {
    match get_setting(conn, company_id, MAX_SESSIONS_KEY)? {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| DieselError::DeserializationError(Box::new(e))),
        None => Ok(None),
    }
}

pub fn set_session_limit(
    conn: &mut SqliteConnection,
    company_id: i32,
    max_sessions: i64,
) -> Result<(), DieselError> {
    put_setting(conn, company_id, MAX_SESSIONS_KEY, &max_sessions.to_string())
}

pub fn delete_session_limit(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<bool, DieselError> {
    delete_setting(conn, company_id, MAX_SESSIONS_KEY)
}

/// Device policy of the company; unrestricted when never configured.
pub fn get_device_control(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<DeviceControl, DieselError> {
    match get_setting(conn, company_id, DEVICE_CONTROL_KEY)? {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| DieselError::DeserializationError(Box::new(e))),
        None => Ok(DeviceControl::default()),
    }
}

pub fn set_device_control(
    conn: &mut SqliteConnection,
    company_id: i32,
    control: &DeviceControl,
) -> Result<(), DieselError> {
    let raw = serde_json::to_string(control)
        .map_err(|e| DieselError::SerializationError(Box::new(e)))?;
    put_setting(conn, company_id, DEVICE_CONTROL_KEY, &raw)
}
