//! Group administration routes
//!
//! Every handler runs its access guards first, in order, before touching
//! anything: role/membership checks, then not-self, then the owner
//! protection where the target could be the owner.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use huddle_shared::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    access,
    auth::{keys, password, AuthUser},
    error::{ApiError, ApiResult},
    models::{account, group, PublicAccountView},
    state::AppState,
};

use super::auth::{is_valid_email, required};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct GetGroupQuery {
    /// `with=users` includes the member list
    pub with: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: group::Group,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<PublicAccountView>>,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    #[serde(rename = "groupID")]
    pub group_id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct SentResponse {
    pub sent: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Fetch a group, optionally with its member list
pub async fn get_group(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<GetGroupQuery>,
) -> ApiResult<Json<GroupResponse>> {
    access::require_membership(&state.pool, group_id, auth_user.id).await?;

    let group = group::find_group(&state.pool, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let users = if query.with.as_deref() == Some("users") {
        Some(group::list_member_views(&state.pool, group_id).await?)
    } else {
        None
    };

    Ok(Json(GroupResponse { group, users }))
}

/// Rename a group
pub async fn update_group(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<UpdateGroupRequest>,
) -> ApiResult<Json<GroupResponse>> {
    access::require_role(&state.pool, Role::Admin, group_id, auth_user.id).await?;

    let name = required(req.name.as_deref(), "name", "Name must be provided")?;

    let group = group::update_group_name(&state.pool, group_id, &name)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(GroupResponse { group, users: None }))
}

/// Invite an email address into a group.
///
/// Unknown addresses get a stub account holding an unusable random password
/// hash and an invite key; the invitee claims it via the invite-acceptance
/// flow. Established members conflict. A pending invitee's stale membership
/// is replaced rather than erroring.
pub async fn invite_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<InviteUserRequest>,
) -> ApiResult<Json<MembershipResponse>> {
    access::require_role(&state.pool, Role::Admin, group_id, auth_user.id).await?;

    let email = required(req.email.as_deref(), "email", "Email must be provided")?.to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email address"));
    }
    let role = req.role.unwrap_or_default();

    let group = group::find_group(&state.pool, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let existing = account::find_internal_by_email(&state.pool, &email).await?;

    let user_id = match existing {
        Some(target) => {
            if target.id == auth_user.id {
                return Err(ApiError::Conflict(
                    "You cannot add yourself to a group".to_string(),
                ));
            }

            let membership = group::find_membership(&state.pool, group_id, target.id).await?;
            if membership.is_some() && !target.is_pending_invite() {
                return Err(ApiError::Conflict(
                    "This user is already a member of the group".to_string(),
                ));
            }

            // Re-invite of a pending invitee: resend the link they may have lost
            if let Some(invite_key) = target.invite_key.clone() {
                let email_service = state.email.clone();
                let to = target.email.clone();
                let group_name = group.name.clone();
                tokio::spawn(async move {
                    email_service
                        .send_group_invite(&to, &group_name, &invite_key)
                        .await;
                });
            }

            target.id
        }
        None => {
            // Random password, replaced when the invitee accepts
            let unusable_hash = password::generate_unusable_hash().map_err(|e| {
                tracing::error!(error = %e, "Failed to generate stub password hash");
                ApiError::Internal
            })?;
            let invite_key = keys::generate_key();
            let verification_key = keys::generate_numeric_key();

            let stub_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO accounts \
                     (id, email, password_hash, invite_key, email_verification_key) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(stub_id)
            .bind(&email)
            .bind(&unusable_hash)
            .bind(&invite_key)
            .bind(&verification_key)
            .execute(&state.pool)
            .await?;

            tracing::info!(account_id = %stub_id, group_id = %group_id, "Stub account created for invite");

            let email_service = state.email.clone();
            let to = email.clone();
            let group_name = group.name.clone();
            tokio::spawn(async move {
                email_service
                    .send_group_invite(&to, &group_name, &invite_key)
                    .await;
            });

            stub_id
        }
    };

    // Replace any stale membership row, then create the requested one
    group::delete_membership(&state.pool, group_id, user_id).await?;
    let membership = group::insert_membership(&state.pool, group_id, user_id, role).await?;

    Ok(Json(MembershipResponse {
        group_id: membership.group_id,
        user_id: membership.user_id,
        role: Some(role),
    }))
}

/// Resend the invitation email to a pending invitee of this group
pub async fn resend_invitation_email(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<SentResponse>> {
    access::require_role(&state.pool, Role::Admin, group_id, auth_user.id).await?;

    let group = group::find_group(&state.pool, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    group::find_membership(&state.pool, group_id, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let target = account::find_internal_by_id(&state.pool, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Only pending invitees have an invitation to resend
    let Some(invite_key) = target.invite_key.clone() else {
        return Err(ApiError::NotFound);
    };

    let email_service = state.email.clone();
    let to = target.email.clone();
    let group_name = group.name.clone();
    tokio::spawn(async move {
        email_service
            .send_group_invite(&to, &group_name, &invite_key)
            .await;
    });

    Ok(Json(SentResponse { sent: true }))
}

/// Change a member's role. The owner is never a valid target.
pub async fn set_role(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<MembershipResponse>> {
    access::require_role(&state.pool, Role::Admin, group_id, auth_user.id).await?;

    let role = req
        .role
        .ok_or_else(|| ApiError::validation("role", "Role must be provided"))?;

    let group = group::find_group(&state.pool, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if group.owner_id == user_id {
        return Err(ApiError::Forbidden(
            "The group owner's role cannot be changed".to_string(),
        ));
    }

    let membership = group::update_membership_role(&state.pool, group_id, user_id, role)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(MembershipResponse {
        group_id: membership.group_id,
        user_id: membership.user_id,
        role: Some(role),
    }))
}

/// Remove a member. Admins cannot remove themselves, and the owner is never
/// a valid target.
pub async fn remove_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<MembershipResponse>> {
    access::require_role(&state.pool, Role::Admin, group_id, auth_user.id).await?;
    access::require_not_self(user_id, auth_user.id)?;

    let group = group::find_group(&state.pool, group_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if group.owner_id == user_id {
        return Err(ApiError::Forbidden(
            "The group owner cannot be removed from the group".to_string(),
        ));
    }

    let removed = group::delete_membership(&state.pool, group_id, user_id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(Json(MembershipResponse {
        group_id,
        user_id,
        role: None,
    }))
}
