//! Runtime configuration for the authentication core.
//!
//! Read from the `auth` table of the Rocket figment (`Rocket.toml`,
//! `ROCKET_AUTH`, or `JWT_SECRET`). Every value except `jwt_secret` has a
//! default.

use std::time::Duration;

use serde::Deserialize;

/// Smallest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// What the session registry does when a company is at its session cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionLimitPolicy {
    /// Refuse the new login with `SessionLimitExceeded`.
    #[default]
    Reject,
    /// Revoke the least recently seen sessions of the company to make room.
    EvictOldest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub token_leeway_secs: u64,
    pub store_timeout_ms: u64,
    pub permission_cache_ttl_secs: u64,
    pub permission_cache_capacity: usize,
    pub session_touch_interval_secs: i64,
    pub session_limit_policy: SessionLimitPolicy,
    pub reset_token_ttl_minutes: i64,
    pub min_password_length: usize,
    pub revoke_other_sessions_on_password_change: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: String::new(),
            access_token_ttl_minutes: 60,
            refresh_token_ttl_days: 7,
            token_leeway_secs: 30,
            store_timeout_ms: 5_000,
            permission_cache_ttl_secs: 30,
            permission_cache_capacity: 256,
            session_touch_interval_secs: 60,
            session_limit_policy: SessionLimitPolicy::Reject,
            reset_token_ttl_minutes: 60,
            min_password_length: 6,
            revoke_other_sessions_on_password_change: true,
        }
    }
}

impl AuthConfig {
    /// Checks values that would make the service insecure or unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_SECRET_LEN
            ));
        }
        if self.access_token_ttl_minutes <= 0 || self.refresh_token_ttl_days <= 0 {
            return Err("token lifetimes must be positive".to_string());
        }
        if self.store_timeout_ms == 0 {
            return Err("auth.store_timeout_ms must be positive".to_string());
        }
        if self.permission_cache_capacity == 0 {
            return Err("auth.permission_cache_capacity must be positive".to_string());
        }
        Ok(())
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_ttl_minutes)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_ttl_days)
    }

    pub fn reset_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reset_token_ttl_minutes)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn permission_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_cache_ttl_secs)
    }
}
