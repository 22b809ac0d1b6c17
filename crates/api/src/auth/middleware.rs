//! Bearer authentication middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Authenticated account identity, inserted as a request extension by
/// [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Require a valid session token on the request.
///
/// The token is read from the Authorization header as a bearer value first,
/// then from the `token` query parameter. The query fallback exists for
/// clients that cannot set headers, e.g. links opened from email.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&req).ok_or(ApiError::Unauthorized)?;

    let claims = state.tokens.verify(&token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(req).await)
}

/// Bearer header first, `token` query parameter second
fn extract_token(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(axum::http::header::AUTHORIZATION) {
        if let Some(token) = value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) {
            return Some(token.to_string());
        }
    }

    req.uri().query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
            .filter(|token| !token.is_empty())
            .map(|token| token.to_string())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, auth_header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth_header {
            builder = builder.header(axum::http::header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_header_is_preferred() {
        let req = request("/api/v1/_authcheck?token=from-query", Some("Bearer from-header"));
        assert_eq!(extract_token(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_query_parameter_fallback() {
        let req = request("/api/v1/_authcheck?redirect=1&token=from-query", None);
        assert_eq!(extract_token(&req).as_deref(), Some("from-query"));
    }

    #[test]
    fn test_no_token_anywhere() {
        let req = request("/api/v1/_authcheck", None);
        assert_eq!(extract_token(&req), None);

        let req = request("/api/v1/_authcheck?token=", None);
        assert_eq!(extract_token(&req), None);

        let req = request("/api/v1/_authcheck", Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&req), None);
    }
}
