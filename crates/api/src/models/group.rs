//! Group and membership records and queries
//!
//! Groups are soft-deleted (`deleted_at`), so every group query filters the
//! tombstones out. Memberships are hard-deleted and unique per
//! (group_id, user_id); the owner holds no membership row.

use huddle_shared::Role;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::account::PublicAccountView;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "ownerID")]
    pub owner_id: Uuid,
    #[serde(with = "time::serde::rfc3339", rename = "createdAt")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339", rename = "updatedAt")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: OffsetDateTime,
}

const GROUP_COLUMNS: &str = "id, name, owner_id, created_at, updated_at";
const MEMBER_COLUMNS: &str = "id, group_id, user_id, role, created_at";

/// Fetch a live (non-tombstoned) group
pub async fn find_group(pool: &PgPool, id: Uuid) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn update_group_name(
    pool: &PgPool,
    id: Uuid,
    name: &str,
) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE groups SET name = $1, updated_at = NOW() \
         WHERE id = $2 AND deleted_at IS NULL RETURNING {GROUP_COLUMNS}"
    ))
    .bind(name)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_membership(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Membership>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = $1 AND user_id = $2"
    ))
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_membership_with_role(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> Result<Option<Membership>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {MEMBER_COLUMNS} FROM group_members \
         WHERE group_id = $1 AND user_id = $2 AND role = $3"
    ))
    .bind(group_id)
    .bind(user_id)
    .bind(role.as_str())
    .fetch_optional(pool)
    .await
}

pub async fn insert_membership(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> Result<Membership, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO group_members (id, group_id, user_id, role) \
         VALUES ($1, $2, $3, $4) RETURNING {MEMBER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(group_id)
    .bind(user_id)
    .bind(role.as_str())
    .fetch_one(pool)
    .await
}

/// Remove a membership; returns the number of rows deleted
pub async fn delete_membership(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn update_membership_role(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> Result<Option<Membership>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE group_members SET role = $1 \
         WHERE group_id = $2 AND user_id = $3 RETURNING {MEMBER_COLUMNS}"
    ))
    .bind(role.as_str())
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Public views of every member of a group
pub async fn list_member_views(
    pool: &PgPool,
    group_id: Uuid,
) -> Result<Vec<PublicAccountView>, sqlx::Error> {
    sqlx::query_as(
        "SELECT a.id, a.email, a.first_name, a.last_name, a.bio, a.email_verified, \
                a.last_login_at, a.created_at \
         FROM accounts a \
         JOIN group_members gm ON gm.user_id = a.id \
         WHERE gm.group_id = $1 \
         ORDER BY gm.created_at",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        huddle_shared::db::create_pool(&url, 5)
            .await
            .expect("connect")
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_membership_pair_is_unique() {
        let pool = pool().await;

        let owner_id = Uuid::new_v4();
        sqlx::query("INSERT INTO accounts (id, email, password_hash) VALUES ($1, $2, 'x')")
            .bind(owner_id)
            .bind(format!("{}@unique-pair.test", Uuid::new_v4()))
            .execute(&pool)
            .await
            .unwrap();

        let group_id = Uuid::new_v4();
        sqlx::query("INSERT INTO groups (id, name, owner_id) VALUES ($1, 'Test', $2)")
            .bind(group_id)
            .bind(owner_id)
            .execute(&pool)
            .await
            .unwrap();

        insert_membership(&pool, group_id, owner_id, Role::Admin)
            .await
            .unwrap();
        let duplicate = insert_membership(&pool, group_id, owner_id, Role::User).await;
        assert!(duplicate.is_err());

        // Cleanup cascades through group_members
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
    async fn test_soft_deleted_groups_are_hidden() {
        let pool = pool().await;

        let group_id = Uuid::new_v4();
        sqlx::query("INSERT INTO groups (id, name, owner_id, deleted_at) VALUES ($1, 'Gone', $2, NOW())")
            .bind(group_id)
            .bind(Uuid::new_v4())
            .execute(&pool)
            .await
            .unwrap();

        assert!(find_group(&pool, group_id).await.unwrap().is_none());

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&pool)
            .await
            .unwrap();
    }
}
