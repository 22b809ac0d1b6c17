//! Authentication routes

use axum::{
    extract::{Extension, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use huddle_shared::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{keys, password, totp, AuthUser},
    error::{ApiError, ApiResult},
    models::account,
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    /// One-time MFA code, required once the account has MFA confirmed
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub group_name: Option<String>,
    /// Accepted as a bool or a date string; anything truthy counts
    pub tos: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_reset_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub tos: Option<serde_json::Value>,
    pub invite_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub redirect: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthCheckResponse {
    pub auth: bool,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub verified: bool,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Helper route for checking auth status
pub async fn authcheck(Extension(auth_user): Extension<AuthUser>) -> Json<AuthCheckResponse> {
    Json(AuthCheckResponse {
        auth: true,
        id: auth_user.id,
    })
}

/// Login with email and password, plus a one-time code when MFA is confirmed.
///
/// Credentials are verified before the MFA gate so an unauthenticated caller
/// cannot probe whether an account has MFA enabled. An unknown email is run
/// through the same Argon2 verification against a decoy hash, keeping both
/// failure paths on one code path with one response.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = required(req.email.as_deref(), "email", "Email must be provided")?.to_lowercase();
    let password = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;

    let account = account::find_internal_by_email(&state.pool, &email).await?;

    let stored_hash = account
        .as_ref()
        .map(|a| a.password_hash.clone())
        .unwrap_or_else(|| state.login_decoy_hash.to_string());

    let valid = password::verify_blocking(password, stored_hash)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password verification failed");
            ApiError::Internal
        })?;

    let Some(account) = account else {
        return Err(ApiError::InvalidCredentials);
    };
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    if account.mfa_required() {
        let Some(secret) = account.mfa_secret.as_deref() else {
            return Err(ApiError::Internal);
        };
        let code = req.token.as_deref().ok_or(ApiError::MfaRequired)?;

        let code_valid = totp::verify_code(secret, code, &state.config.totp_issuer, &account.email)
            .map_err(|e| {
                tracing::error!(error = %e, "TOTP verification failed");
                ApiError::Internal
            })?;

        if !code_valid {
            return Err(ApiError::InvalidMfaCode);
        }
    }

    let response = issue_token(&state, account.id, &account.email)?;

    // Best-effort: a failed timestamp update must not fail the login
    let pool = state.pool.clone();
    let account_id = account.id;
    tokio::spawn(async move {
        if let Err(e) = account::touch_last_login(&pool, account_id).await {
            tracing::warn!(account_id = %account_id, error = %e, "Failed to update last_login_at");
        }
    });

    Ok(response)
}

/// Sign up: create the account, its group, and an Admin membership.
///
/// The three inserts run in one transaction; partial failure aborts the whole
/// sign-up rather than leaving orphaned rows.
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = required(req.email.as_deref(), "email", "Email must be provided")?.to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email address"));
    }

    let password = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;
    check_password_strength(&password, "password")?;

    let first_name = uc_first(&required(
        req.first_name.as_deref(),
        "firstName",
        "You must provide your first name",
    )?);
    let last_name = uc_first(req.last_name.as_deref().unwrap_or("").trim());

    let tos = truthy_marker(req.tos.as_ref()).ok_or_else(|| {
        ApiError::validation(
            "tos",
            "You must accept the Terms of Service to use this platform",
        )
    })?;

    if account::email_exists(&state.pool, &email).await? {
        return Err(ApiError::validation("email", "This email address is taken"));
    }

    let group_name = match req.group_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{first_name}'s Team"),
    };

    let password_hash = password::hash_blocking(password).await.map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let account_id = Uuid::new_v4();
    let group_id = Uuid::new_v4();
    let verification_key = keys::generate_key();

    let mut tx = state.pool.begin().await?;

    sqlx::query("INSERT INTO groups (id, name, owner_id) VALUES ($1, $2, $3)")
        .bind(group_id)
        .bind(&group_name)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO group_members (id, group_id, user_id, role) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(group_id)
        .bind(account_id)
        .bind(Role::Admin.as_str())
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO accounts \
             (id, email, password_hash, first_name, last_name, tos, email_verification_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(account_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&tos)
    .bind(&verification_key)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(account_id = %account_id, group_id = %group_id, "Account created");

    // Verification email is fire-and-forget
    let email_service = state.email.clone();
    let to = email.clone();
    tokio::spawn(async move {
        email_service
            .send_email_verification(&to, &verification_key)
            .await;
    });

    issue_token(&state, account_id, &email)
}

/// Verify an email address with a single-use key
pub async fn verify_email(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VerifyEmailQuery>,
) -> ApiResult<Response> {
    let account_id = account::consume_verification_key(&state.pool, &key)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(account_id = %account_id, "Email verified");

    if query.redirect.as_deref() == Some("1") {
        let target = format!("{}/login", state.config.frontend_url);
        return Ok(Redirect::to(&target).into_response());
    }

    Ok(Json(VerifiedResponse {
        verified: true,
        id: account_id,
    })
    .into_response())
}

/// Request a password reset link
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let email = required(req.email.as_deref(), "email", "Email must be provided")?.to_lowercase();

    let account = account::find_internal_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| {
            ApiError::validation("email", "No account with that email address exists")
        })?;

    let reset_key = keys::generate_key();
    account::set_password_reset_key(&state.pool, account.id, &reset_key).await?;

    let email_service = state.email.clone();
    tokio::spawn(async move {
        email_service
            .send_password_reset(&account.email, &reset_key)
            .await;
    });

    Ok(Json(SuccessResponse { success: true }))
}

/// Look up the account behind a reset key, for prefilling the reset form
pub async fn get_user_by_reset_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<account::IdEmail>> {
    let found = account::find_by_reset_key(&state.pool, &key)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(found))
}

/// Reset the password with a single-use key
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = required(req.email.as_deref(), "email", "Email must be provided")?.to_lowercase();
    let password = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;
    check_password_strength(&password, "password")?;
    let reset_key = required(
        req.password_reset_key.as_deref(),
        "passwordResetKey",
        "Password reset key must be provided",
    )?;

    let password_hash = password::hash_blocking(password).await.map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let account = account::consume_reset_key(&state.pool, &email, &reset_key, &password_hash)
        .await?
        .ok_or_else(|| ApiError::validation("passwordResetKey", "Invalid password reset key"))?;

    tracing::info!(account_id = %account.id, "Password reset");

    issue_token(&state, account.id, &account.email)
}

/// Look up the account behind an invite key, for prefilling the invite form
pub async fn get_user_by_invite_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<account::IdEmail>> {
    let found = account::find_by_invite_key(&state.pool, &key)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(found))
}

/// Accept an invitation: set credentials and profile on the stub account
pub async fn accept_invite(
    State(state): State<AppState>,
    Json(req): Json<AcceptInviteRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let invite_key = required(
        req.invite_key.as_deref(),
        "inviteKey",
        "Invite key must be provided",
    )?;
    let password = required_verbatim(
        req.password.as_deref(),
        "password",
        "Password must be provided",
    )?;
    check_password_strength(&password, "password")?;
    let first_name = uc_first(&required(
        req.first_name.as_deref(),
        "firstName",
        "You must provide your first name",
    )?);
    let last_name = uc_first(req.last_name.as_deref().unwrap_or("").trim());
    let tos = truthy_marker(req.tos.as_ref()).ok_or_else(|| {
        ApiError::validation(
            "tos",
            "You must accept the Terms of Service to use this platform",
        )
    })?;

    let invited = account::find_by_invite_key(&state.pool, &invite_key)
        .await?
        .ok_or(ApiError::NotFound)?;

    let password_hash = password::hash_blocking(password).await.map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    // The invite key doubles as proof of email ownership
    sqlx::query(
        "UPDATE accounts SET password_hash = $1, first_name = $2, last_name = $3, tos = $4, \
             email_verified = TRUE, invite_key = NULL, email_verification_key = NULL, \
             updated_at = NOW() \
         WHERE id = $5",
    )
    .bind(&password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&tos)
    .bind(invited.id)
    .execute(&state.pool)
    .await?;

    tracing::info!(account_id = %invited.id, "Invite accepted");

    issue_token(&state, invited.id, &invited.email)
}

// =============================================================================
// Helpers
// =============================================================================

/// Issue a session token, mapping signing failures to a generic 500
fn issue_token(
    state: &AppState,
    account_id: Uuid,
    email: &str,
) -> ApiResult<Json<TokenResponse>> {
    let access_token = state.tokens.issue(account_id, email).map_err(|e| {
        tracing::error!(error = %e, "Token issuance failed");
        ApiError::Internal
    })?;

    Ok(Json(TokenResponse { access_token }))
}

/// Presence check producing a field-scoped validation error
pub(super) fn required(value: Option<&str>, field: &str, msg: &str) -> ApiResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ApiError::validation(field, msg)),
    }
}

/// Presence check that leaves the value untouched. Passwords are never
/// trimmed: whatever was typed is what hashes.
pub(super) fn required_verbatim(value: Option<&str>, field: &str, msg: &str) -> ApiResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ApiError::validation(field, msg)),
    }
}

/// Password strength policy, scoped to the field that carried the password
pub(super) fn check_password_strength(password: &str, field: &str) -> ApiResult<()> {
    password::validate_password_strength(password)
        .map_err(|e| ApiError::validation(field, e.to_string()))
}

/// Uppercase the first character, as profile names are stored
pub(super) fn uc_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Terms-of-service acceptance marker: a truthy value serialized for storage
fn truthy_marker(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::Bool(true)) => Some("true".to_string()),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) if n.as_i64() != Some(0) => Some(n.to_string()),
        _ => None,
    }
}

/// Pragmatic email shape check; real validation happens via the
/// verification email
pub(super) fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let (local, domain) = (parts[0], parts[1]);

    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_alphanumeric() || ".+-_".contains(c))
    {
        return false;
    }

    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    if domain.starts_with('-') || domain.ends_with('-') {
        return false;
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return false;
    }

    let domain_parts: Vec<&str> = domain.split('.').collect();
    if domain_parts.len() < 2 {
        return false;
    }
    if let Some(tld) = domain_parts.last() {
        if tld.len() < 2 || !tld.chars().all(|c| c.is_alphabetic()) {
            return false;
        }
    }

    domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@example.co.uk"));

        assert!(!is_valid_email("anthonybudd@"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("double@@example.com"));
        assert!(!is_valid_email(".leading@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@example.c"));
    }

    #[test]
    fn test_uc_first() {
        assert_eq!(uc_first("anthony"), "Anthony");
        assert_eq!(uc_first("Anthony"), "Anthony");
        assert_eq!(uc_first(""), "");
    }

    #[test]
    fn test_required_trims_and_rejects_empty() {
        assert_eq!(
            required(Some("  value  "), "field", "msg").unwrap(),
            "value"
        );
        assert!(required(Some("   "), "field", "msg").is_err());
        assert!(required(None, "field", "msg").is_err());
    }

    #[test]
    fn test_passwords_are_never_trimmed() {
        assert_eq!(
            required_verbatim(Some("  spaced pass  "), "password", "msg").unwrap(),
            "  spaced pass  "
        );
        assert!(required_verbatim(Some(""), "password", "msg").is_err());
        assert!(required_verbatim(None, "password", "msg").is_err());
    }

    #[test]
    fn test_truthy_marker() {
        use serde_json::json;

        assert_eq!(truthy_marker(Some(&json!(true))).as_deref(), Some("true"));
        assert_eq!(
            truthy_marker(Some(&json!("2020-03-20"))).as_deref(),
            Some("2020-03-20")
        );
        assert_eq!(truthy_marker(Some(&json!(1))).as_deref(), Some("1"));

        assert!(truthy_marker(Some(&json!(false))).is_none());
        assert!(truthy_marker(Some(&json!(""))).is_none());
        assert!(truthy_marker(Some(&json!(0))).is_none());
        assert!(truthy_marker(Some(&json!(null))).is_none());
        assert!(truthy_marker(None).is_none());
    }

    #[test]
    fn test_password_strength_errors_name_the_field() {
        let err = check_password_strength("weak", "newPassword").unwrap_err();
        match err {
            ApiError::Validation { field, .. } => assert_eq!(field, "newPassword"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
