use std::sync::Arc;

use rocket::fairing::AdHoc;

use super::config::AuthConfig;
use super::notifier::ResetNotifier;
use super::permission_resolver::PermissionResolver;
use super::token::TokenCodec;

/// Shared authentication state, held in Rocket managed state.
pub struct AuthContext {
    pub config: AuthConfig,
    pub codec: TokenCodec,
    pub resolver: PermissionResolver,
    pub notifier: Arc<dyn ResetNotifier>,
}

impl AuthContext {
    /// Validates `config` and builds the codec and resolver from it.
    pub fn new(config: AuthConfig, notifier: Arc<dyn ResetNotifier>) -> Result<Self, String> {
        let codec = TokenCodec::new(&config)?;
        let resolver = PermissionResolver::new(&config);
        Ok(AuthContext {
            config,
            codec,
            resolver,
            notifier,
        })
    }
}

/// Reads the `auth` table from the figment and installs [`AuthContext`].
///
/// Ignition fails when the table is unreadable or the secret is unusable.
pub fn auth_context_fairing(notifier: Arc<dyn ResetNotifier>) -> AdHoc {
    AdHoc::try_on_ignite("Auth Context", move |rocket| async move {
        let config = if rocket.figment().contains("auth") {
            match rocket.figment().extract_inner::<AuthConfig>("auth") {
                Ok(config) => config,
                Err(e) => {
                    error!("[auth-init] ERROR: Could not read auth config: {}", e);
                    return Err(rocket);
                }
            }
        } else {
            AuthConfig::default()
        };

        match AuthContext::new(config, notifier) {
            Ok(context) => {
                info!(
                    "[auth-init] Tokens: access {} min, refresh {} days; session limit policy {:?}",
                    context.config.access_token_ttl_minutes,
                    context.config.refresh_token_ttl_days,
                    context.config.session_limit_policy
                );
                Ok(rocket.manage(context))
            }
            Err(e) => {
                error!("[auth-init] ERROR: {}", e);
                Err(rocket)
            }
        }
    })
}
