//! Group access guards
//!
//! Each guard either returns `Ok(())` (continue into the handler body) or a
//! terminal `ApiError`. Handlers call them explicitly, in order, before doing
//! any work, so the access chain for every route is visible at the call site.
//!
//! Ownership and role are deliberately split: `groups.owner_id` is a
//! structural invariant (a group always has exactly one owner, who cannot be
//! removed), while User/Admin memberships are the revocable layer on top.

use huddle_shared::Role;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::group,
};

/// Allow when the account holds `role` in the group. For Admin checks, the
/// group owner passes even with no membership row at all.
pub async fn require_role(
    pool: &PgPool,
    role: Role,
    group_id: Uuid,
    account_id: Uuid,
) -> ApiResult<()> {
    if group::find_membership_with_role(pool, group_id, account_id, role)
        .await?
        .is_some()
    {
        return Ok(());
    }

    if role == Role::Admin {
        let group = group::find_group(pool, group_id)
            .await?
            .ok_or(ApiError::NotFound)?;

        if group.owner_id == account_id {
            return Ok(());
        }
    }

    Err(ApiError::Forbidden(format!(
        "You do not have the role \"{role}\" in group \"{group_id}\""
    )))
}

/// Allow when the account holds any membership in the group, regardless of role
pub async fn require_membership(pool: &PgPool, group_id: Uuid, account_id: Uuid) -> ApiResult<()> {
    if group::find_membership(pool, group_id, account_id)
        .await?
        .is_some()
    {
        return Ok(());
    }

    Err(ApiError::Forbidden(format!(
        "You do not have access to group {group_id}"
    )))
}

/// Block an account from targeting itself (e.g. removing its own membership)
pub fn require_not_self(target_user_id: Uuid, acting_account_id: Uuid) -> ApiResult<()> {
    if target_user_id == acting_account_id {
        return Err(ApiError::Forbidden("Access error".to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_self_guard() {
        let acting = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(require_not_self(other, acting).is_ok());
        assert!(matches!(
            require_not_self(acting, acting),
            Err(ApiError::Forbidden(_))
        ));
    }

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        huddle_shared::db::create_pool(&url, 5)
            .await
            .expect("connect")
    }

    async fn seed_account(pool: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO accounts (id, email, password_hash) VALUES ($1, $2, 'x')")
            .bind(id)
            .bind(format!("{id}@access.test"))
            .execute(pool)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_owner_passes_admin_check_without_membership() {
        let pool = pool().await;
        let owner_id = seed_account(&pool).await;

        let group_id = Uuid::new_v4();
        sqlx::query("INSERT INTO groups (id, name, owner_id) VALUES ($1, 'Owned', $2)")
            .bind(group_id)
            .bind(owner_id)
            .execute(&pool)
            .await
            .unwrap();

        // Zero membership rows for the owner
        assert!(require_role(&pool, Role::Admin, group_id, owner_id)
            .await
            .is_ok());

        // But plain membership still fails: ownership is not a membership
        assert!(require_membership(&pool, group_id, owner_id).await.is_err());

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(owner_id)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_role_hierarchy_and_unknown_group() {
        let pool = pool().await;
        let owner_id = seed_account(&pool).await;
        let member_id = seed_account(&pool).await;

        let group_id = Uuid::new_v4();
        sqlx::query("INSERT INTO groups (id, name, owner_id) VALUES ($1, 'Roles', $2)")
            .bind(group_id)
            .bind(owner_id)
            .execute(&pool)
            .await
            .unwrap();
        group::insert_membership(&pool, group_id, member_id, Role::User)
            .await
            .unwrap();

        // A User member is not an Admin
        assert!(require_role(&pool, Role::User, group_id, member_id)
            .await
            .is_ok());
        assert!(matches!(
            require_role(&pool, Role::Admin, group_id, member_id).await,
            Err(ApiError::Forbidden(_))
        ));

        // Admin check against a group that does not exist is a 404
        assert!(matches!(
            require_role(&pool, Role::Admin, Uuid::new_v4(), member_id).await,
            Err(ApiError::NotFound)
        ));

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&pool)
            .await
            .unwrap();
        for id in [owner_id, member_id] {
            sqlx::query("DELETE FROM accounts WHERE id = $1")
                .bind(id)
                .execute(&pool)
                .await
                .unwrap();
        }
    }
}
