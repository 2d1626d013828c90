use chrono::NaiveDateTime;
use diesel::{Identifiable, Insertable, Queryable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::device_sessions;

/// One logged-in device. Live while `revoked_at` is null.
#[derive(Queryable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[diesel(table_name = device_sessions, primary_key(session_id))]
#[ts(export)]
pub struct DeviceSession {
    pub session_id: String,
    pub user_id: i32,
    pub device_id: String,
    pub device_name: Option<String>,
    pub company_id: Option<i32>,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
    #[ts(type = "string")]
    pub last_seen_at: NaiveDateTime,
    #[ts(type = "string | null")]
    pub revoked_at: Option<NaiveDateTime>,
    pub revoked_reason: Option<String>,
}

impl DeviceSession {
    pub fn is_live(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = device_sessions)]
pub struct NewDeviceSession {
    pub session_id: String,
    pub user_id: i32,
    pub device_id: String,
    pub device_name: Option<String>,
    pub company_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub last_seen_at: NaiveDateTime,
}

/// Why a session left the live state. Stored for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    Logout,
    Replaced,
    Admin,
    Evicted,
    PasswordReset,
    PasswordChange,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Logout => "logout",
            RevokeReason::Replaced => "replaced",
            RevokeReason::Admin => "admin",
            RevokeReason::Evicted => "evicted",
            RevokeReason::PasswordReset => "password_reset",
            RevokeReason::PasswordChange => "password_change",
        }
    }
}
