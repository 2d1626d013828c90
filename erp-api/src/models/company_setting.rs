use chrono::NaiveDateTime;
use diesel::Insertable;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::company_settings;

/// Setting key holding the per-company cap on live device sessions.
pub const MAX_SESSIONS_KEY: &str = "max_sessions";
/// Setting key holding the JSON encoded [`DeviceControl`] policy.
pub const DEVICE_CONTROL_KEY: &str = "device_control";

#[derive(Insertable, Debug)]
#[diesel(table_name = company_settings)]
pub struct NewCompanySetting {
    pub company_id: i32,
    pub key: String,
    pub value: String,
    pub updated_at: NaiveDateTime,
}

/// Which device identifiers may open sessions for a company's users.
///
/// With `restrict_devices` off every device is accepted and the list is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeviceControl {
    #[serde(default)]
    pub restrict_devices: bool,
    #[serde(default)]
    pub allowed_device_ids: Vec<String>,
}

impl DeviceControl {
    pub fn permits(&self, device_id: &str) -> bool {
        !self.restrict_devices || self.allowed_device_ids.iter().any(|d| d == device_id)
    }
}
