//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{password, TokenService},
    config::Config,
    email::{EmailConfig, EmailService},
    error::ApiError,
};

/// State shared by every handler. Constructed once at process start; the
/// token service and decoy hash in particular must not be rebuilt per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub email: EmailService,
    /// Verified against when login hits an unknown email, so the unknown-email
    /// and wrong-password paths cost the same Argon2 work and return the same
    /// response.
    pub login_decoy_hash: Arc<str>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Result<Self, ApiError> {
        let tokens = TokenService::from_pem_files(
            &config.jwt_private_key_path,
            &config.jwt_public_key_path,
            config.jwt_expiry_hours,
        )
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load token signing keys");
            ApiError::Internal
        })?;

        let email = EmailService::new(EmailConfig {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
            frontend_url: config.frontend_url.clone(),
        });

        let login_decoy_hash = password::generate_unusable_hash().map_err(|e| {
            tracing::error!(error = %e, "Failed to generate login decoy hash");
            ApiError::Internal
        })?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            tokens,
            email,
            login_decoy_hash: Arc::from(login_decoy_hash),
        })
    }
}
