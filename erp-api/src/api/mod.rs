//! HTTP endpoints, mounted under `/api/v1`.
//!
//! Handlers stay thin: guards authenticate and authorize, the `auth`
//! services do the work, and every failure leaves as an [`AuthError`]
//! response with a stable `code`.
//!
//! [`AuthError`]: crate::auth::AuthError

use rocket::Route;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub mod auth;
pub mod company;
pub mod device_session;
pub mod role;
pub mod settings;
pub mod status;

/// Body of endpoints that only confirm an action.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}

/// Returns a vector of all routes of the API.
pub fn routes() -> Vec<Route> {
    auth::routes()
        .into_iter()
        .chain(company::routes())
        .chain(device_session::routes())
        .chain(role::routes())
        .chain(settings::routes())
        .chain(status::routes())
        .collect()
}
