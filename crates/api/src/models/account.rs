//! Account records and queries
//!
//! Two projections with compile-time separation: `InternalAccountRecord`
//! carries credential and key material and is never serialized;
//! `PublicAccountView` is the only shape that leaves the API.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Full account row, for credential checks and key lookups only.
/// Deliberately not `Serialize`.
#[derive(Debug, Clone, FromRow)]
pub struct InternalAccountRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub tos: Option<String>,
    pub email_verified: bool,
    pub email_verification_key: Option<String>,
    pub password_reset_key: Option<String>,
    pub invite_key: Option<String>,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl InternalAccountRecord {
    /// MFA gates login only once a secret has been confirmed into place
    pub fn mfa_required(&self) -> bool {
        self.mfa_enabled && self.mfa_secret.is_some()
    }

    /// Pending-invite lifecycle state
    pub fn is_pending_invite(&self) -> bool {
        self.invite_key.is_some()
    }
}

/// Account shape exposed over the API: no credential or key fields
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccountView {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<InternalAccountRecord> for PublicAccountView {
    fn from(record: InternalAccountRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            bio: record.bio,
            email_verified: record.email_verified,
            last_login_at: record.last_login_at,
            created_at: record.created_at,
        }
    }
}

/// Id/email pair returned by the key lookup endpoints
#[derive(Debug, Serialize, FromRow)]
pub struct IdEmail {
    pub id: Uuid,
    pub email: String,
}

const INTERNAL_COLUMNS: &str = "id, email, password_hash, first_name, last_name, bio, tos, \
     email_verified, email_verification_key, password_reset_key, invite_key, \
     mfa_enabled, mfa_secret, last_login_at, created_at, updated_at";

/// Look up the full record by lowercase email
pub async fn find_internal_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<InternalAccountRecord>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {INTERNAL_COLUMNS} FROM accounts WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

/// Look up the full record by id
pub async fn find_internal_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<InternalAccountRecord>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {INTERNAL_COLUMNS} FROM accounts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Look up the public view by id
pub async fn find_public_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<PublicAccountView>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, email, first_name, last_name, bio, email_verified, last_login_at, created_at \
         FROM accounts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    let exists: Option<(bool,)> =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)")
            .bind(email)
            .fetch_optional(pool)
            .await?;
    Ok(exists.map(|r| r.0).unwrap_or(false))
}

/// Consume an email verification key: mark verified and clear the key in one
/// statement so the key is single-use. Returns the account id on a hit.
pub async fn consume_verification_key(
    pool: &PgPool,
    key: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "UPDATE accounts SET email_verified = TRUE, email_verification_key = NULL, updated_at = NOW() \
         WHERE email_verification_key = $1 RETURNING id",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

pub async fn find_by_reset_key(pool: &PgPool, key: &str) -> Result<Option<IdEmail>, sqlx::Error> {
    sqlx::query_as("SELECT id, email FROM accounts WHERE password_reset_key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_invite_key(pool: &PgPool, key: &str) -> Result<Option<IdEmail>, sqlx::Error> {
    sqlx::query_as("SELECT id, email FROM accounts WHERE invite_key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn set_password_reset_key(
    pool: &PgPool,
    id: Uuid,
    key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET password_reset_key = $1, updated_at = NOW() WHERE id = $2")
        .bind(key)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Consume a password reset key: swap in the new hash and clear the key in
/// one statement, keyed on the (email, key) pair. Returns the account on a hit.
pub async fn consume_reset_key(
    pool: &PgPool,
    email: &str,
    key: &str,
    password_hash: &str,
) -> Result<Option<IdEmail>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE accounts SET password_hash = $1, password_reset_key = NULL, updated_at = NOW() \
         WHERE email = $2 AND password_reset_key = $3 RETURNING id, email",
    )
    .bind(password_hash)
    .bind(email)
    .bind(key)
    .fetch_optional(pool)
    .await
}

/// Best-effort post-login timestamp update
pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET last_login_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> InternalAccountRecord {
        InternalAccountRecord {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            first_name: "A".to_string(),
            last_name: "".to_string(),
            bio: None,
            tos: Some("true".to_string()),
            email_verified: false,
            email_verification_key: Some("abc123".to_string()),
            password_reset_key: None,
            invite_key: None,
            mfa_enabled: false,
            mfa_secret: None,
            last_login_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_mfa_required_needs_both_fields() {
        let mut account = record();
        assert!(!account.mfa_required());

        // Enabled flag alone is not enough (pending confirmation keeps it false)
        account.mfa_secret = Some("SECRET".to_string());
        assert!(!account.mfa_required());

        account.mfa_enabled = true;
        assert!(account.mfa_required());
    }

    #[test]
    fn test_public_view_carries_no_secret_fields() {
        let view = PublicAccountView::from(record());
        let json = serde_json::to_value(&view).unwrap();
        let object = json.as_object().unwrap();

        assert!(object.contains_key("email"));
        assert!(object.contains_key("firstName"));
        assert!(!object.contains_key("passwordHash"));
        assert!(!object.contains_key("password_hash"));
        assert!(!object.contains_key("mfaSecret"));
        assert!(!object.contains_key("emailVerificationKey"));
        assert!(!object.contains_key("passwordResetKey"));
        assert!(!object.contains_key("inviteKey"));
    }
}
