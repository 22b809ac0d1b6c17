//! Current-user routes: profile, password, and the MFA lifecycle
//!
//! MFA state machine: Disabled -> PendingConfirmation (secret stored,
//! mfa_enabled false) -> Enabled -> Disabled. Enable and disable re-check the
//! account password; confirm re-checks a live one-time code.

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{password, totp, AuthUser},
    error::{ApiError, ApiResult},
    models::{account, PublicAccountView},
    state::AppState,
};

use super::auth::{check_password_strength, required_verbatim};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordGateRequest {
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmMfaRequest {
    /// 6-digit code from the authenticator app
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableMfaResponse {
    /// Base32 secret for manual entry
    pub secret: String,
    /// otpauth enrollment URI
    pub otpauth_url: String,
    /// The same URI as a base64 PNG data URL
    pub qr_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaStatusResponse {
    pub mfa_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Get the current user's profile
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PublicAccountView>> {
    let view = account::find_public_by_id(&state.pool, auth_user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(view))
}

/// Update profile fields; absent fields are left untouched
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<PublicAccountView>> {
    sqlx::query(
        "UPDATE accounts SET \
             first_name = COALESCE($1, first_name), \
             last_name = COALESCE($2, last_name), \
             bio = COALESCE($3, bio), \
             updated_at = NOW() \
         WHERE id = $4",
    )
    .bind(req.first_name.as_deref())
    .bind(req.last_name.as_deref())
    .bind(req.bio.as_deref())
    .bind(auth_user.id)
    .execute(&state.pool)
    .await?;

    let view = account::find_public_by_id(&state.pool, auth_user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(view))
}

/// Change the password, gated on the current one
pub async fn update_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdatePasswordRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let current = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;
    let new_password = required_verbatim(
        req.new_password.as_deref(),
        "newPassword",
        "New password must be provided",
    )?;
    check_password_strength(&new_password, "newPassword")?;

    verify_current_password(&state, auth_user.id, current).await?;

    let password_hash = password::hash_blocking(new_password).await.map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    sqlx::query("UPDATE accounts SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&password_hash)
        .bind(auth_user.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(account_id = %auth_user.id, "Password changed");

    Ok(Json(SuccessResponse { success: true }))
}

/// Start MFA enrollment: store a fresh pending secret and return the
/// provisioning targets. Login is not gated until the secret is confirmed.
pub async fn enable_mfa(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PasswordGateRequest>,
) -> ApiResult<Json<EnableMfaResponse>> {
    let current = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;
    verify_current_password(&state, auth_user.id, current).await?;

    let secret = totp::generate_secret();

    // PendingConfirmation: secret in place, gate still off
    sqlx::query(
        "UPDATE accounts SET mfa_secret = $1, mfa_enabled = FALSE, updated_at = NOW() WHERE id = $2",
    )
    .bind(&secret)
    .bind(auth_user.id)
    .execute(&state.pool)
    .await?;

    let issuer = &state.config.totp_issuer;
    let otpauth_url = totp::provisioning_uri(&secret, issuer, &auth_user.email)
        .map_err(|_| ApiError::Internal)?;
    let qr_code = totp::qr_code_data_url(&secret, issuer, &auth_user.email)
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(account_id = %auth_user.id, "MFA enrollment started");

    Ok(Json(EnableMfaResponse {
        secret,
        otpauth_url,
        qr_code,
    }))
}

/// Confirm MFA enrollment with a live code; only then does login require MFA
pub async fn confirm_mfa(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<ConfirmMfaRequest>,
) -> ApiResult<Json<MfaStatusResponse>> {
    let code = req.token.as_deref().unwrap_or_default();

    let record = account::find_internal_by_id(&state.pool, auth_user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // No pending secret means there is nothing to confirm
    let Some(secret) = record.mfa_secret.as_deref() else {
        return Err(ApiError::InvalidMfaCode);
    };

    let valid = totp::verify_code(secret, code, &state.config.totp_issuer, &record.email)
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP verification failed");
            ApiError::Internal
        })?;

    // The pending secret survives a failed attempt so the user can retry
    if !valid {
        return Err(ApiError::InvalidMfaCode);
    }

    sqlx::query("UPDATE accounts SET mfa_enabled = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(auth_user.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(account_id = %auth_user.id, "MFA enabled");

    Ok(Json(MfaStatusResponse { mfa_enabled: true }))
}

/// Disable MFA, gated on the current password. Clears both the flag and the
/// secret; re-enabling starts over with a fresh secret.
pub async fn disable_mfa(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PasswordGateRequest>,
) -> ApiResult<Json<MfaStatusResponse>> {
    let current = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;
    verify_current_password(&state, auth_user.id, current).await?;

    sqlx::query(
        "UPDATE accounts SET mfa_enabled = FALSE, mfa_secret = NULL, updated_at = NOW() WHERE id = $1",
    )
    .bind(auth_user.id)
    .execute(&state.pool)
    .await?;

    tracing::info!(account_id = %auth_user.id, "MFA disabled");

    Ok(Json(MfaStatusResponse { mfa_enabled: false }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Re-authentication gate: verify the caller's current password
async fn verify_current_password(
    state: &AppState,
    account_id: uuid::Uuid,
    password_attempt: String,
) -> ApiResult<()> {
    let record = account::find_internal_by_id(&state.pool, account_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let valid = password::verify_blocking(password_attempt, record.password_hash)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password verification failed");
            ApiError::Internal
        })?;

    if !valid {
        return Err(ApiError::IncorrectPassword);
    }

    Ok(())
}
