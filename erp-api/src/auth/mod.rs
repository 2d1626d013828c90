//! Authentication and authorization core.
//!
//! Tokens prove who is calling; the session registry decides whether that
//! proof still counts; the permission resolver decides what the caller's
//! role may do. [`service`] composes them into the login, refresh and
//! password flows used by the HTTP layer.

pub mod config;
pub mod context;
pub mod error;
pub mod notifier;
pub mod permission_resolver;
pub mod role_admin;
pub mod service;
pub mod token;

pub use config::{AuthConfig, SessionLimitPolicy};
pub use context::{AuthContext, auth_context_fairing};
pub use error::{AuthError, ErrorResponse};
pub use notifier::{LogNotifier, RecordingNotifier, ResetNotifier};
pub use permission_resolver::{PermissionResolver, RoleGrant};
pub use token::{ClaimSet, Claims, TokenCodec, TokenKind, extract_bearer};

/// Name of the seeded role that carries the permission wildcard.
pub const ADMIN_ROLE: &str = "Admin";

pub const VIEW_SESSIONS: &str = "VIEW_SESSIONS";
pub const MANAGE_SESSIONS: &str = "MANAGE_SESSIONS";
pub const VIEW_SETTINGS: &str = "VIEW_SETTINGS";
pub const MANAGE_SETTINGS: &str = "MANAGE_SETTINGS";
