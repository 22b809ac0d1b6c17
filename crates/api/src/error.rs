//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("MFA is enabled for this account, you must provide a one-time code")]
    MfaRequired,
    #[error("Invalid MFA code")]
    InvalidMfaCode,
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),

    // Validation errors, keyed by the offending field
    #[error("{msg}")]
    Validation { field: String, msg: String },

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Field-scoped validation error, the shape the frontend binds to inputs
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Validation errors carry a per-field error map; everything else is a
        // flat message/code pair.
        if let ApiError::Validation { field, msg } = &self {
            let mut errors = serde_json::Map::new();
            errors.insert(field.clone(), json!({ "param": field, "msg": msg }));
            let body = Json(json!({ "errors": errors }));
            return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
        }

        let (status, message) = match &self {
            ApiError::InvalidCredentials
            | ApiError::InvalidMfaCode
            | ApiError::IncorrectPassword
            | ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::MfaRequired => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Database(detail) => {
                // Detail is logged by the From impl; only surface it in debug builds
                let message = if cfg!(debug_assertions) {
                    format!("Database error: {detail}")
                } else {
                    "Internal server error".to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Validation { .. } => unreachable!(),
        };

        let body = Json(json!({
            "message": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // PostgreSQL unique violation
                    if code == "23505" {
                        return ApiError::Conflict("Resource already exists".to_string());
                    }
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_validation_errors_are_field_scoped() {
        let response = ApiError::validation("password", "Password must be at least 7 characters")
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["errors"]["password"]["param"], "password");
        assert_eq!(
            body["errors"]["password"]["msg"],
            "Password must be at least 7 characters"
        );
    }

    #[tokio::test]
    async fn test_credential_failures_share_a_generic_message() {
        let response = ApiError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Incorrect email or password");
        assert_eq!(body["code"], 401);
    }

    #[tokio::test]
    async fn test_mfa_required_is_forbidden() {
        let response = ApiError::MfaRequired.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
