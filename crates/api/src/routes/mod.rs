//! API routes

pub mod auth;
pub mod groups;
pub mod health;
pub mod users;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check at root level for infrastructure monitoring
    let health_routes = Router::new().route("/health", get(health::health));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/sign-up", post(auth::sign_up))
        .route("/auth/verify-email/:key", get(auth::verify_email))
        .route("/auth/forgot", post(auth::forgot_password))
        .route(
            "/auth/get-user-by-reset-key/:key",
            get(auth::get_user_by_reset_key),
        )
        .route("/auth/reset", post(auth::reset_password))
        .route(
            "/auth/get-user-by-invite-key/:key",
            get(auth::get_user_by_invite_key),
        )
        .route("/auth/invite", post(auth::accept_invite));

    // Bearer-authenticated routes - under /api/v1.
    // Group-scoped role/membership guards run inside the handlers, in order,
    // before any work.
    let protected_api_routes = Router::new()
        .route("/_authcheck", get(auth::authcheck))
        // Current user + MFA lifecycle
        .route("/user", get(users::get_user).post(users::update_user))
        .route("/user/update-password", post(users::update_password))
        .route("/user/enable-mfa", post(users::enable_mfa))
        .route("/user/confirm-mfa", post(users::confirm_mfa))
        .route("/user/disable-mfa", post(users::disable_mfa))
        // Group administration
        .route(
            "/groups/:group_id",
            get(groups::get_group).post(groups::update_group),
        )
        .route("/groups/:group_id/users/invite", post(groups::invite_user))
        .route(
            "/groups/:group_id/users/:user_id/resend-invitation-email",
            post(groups::resend_invitation_email),
        )
        .route(
            "/groups/:group_id/users/:user_id/set-role",
            post(groups::set_role),
        )
        .route(
            "/groups/:group_id/users/:user_id",
            delete(groups::remove_user),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
