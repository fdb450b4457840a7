use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::member_repository::MemberRepository;
use crate::models::member::Member;

pub struct PostgresMemberRepository {
    pub pool: PgPool,
}

#[async_trait]
impl MemberRepository for PostgresMemberRepository {
    async fn find_member_by_id(&self, member_id: Uuid) -> Result<Option<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT id, email, role, is_active, setup_completed, created_at
            FROM members
            WHERE id = $1
            "#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_members(&self) -> Result<Vec<Member>, sqlx::Error> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT id, email, role, is_active, setup_completed, created_at
            FROM members
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn set_member_active(
        &self,
        member_id: Uuid,
        is_active: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE members SET is_active = $2 WHERE id = $1")
            .bind(member_id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_setup_completed(&self, member_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE members SET setup_completed = true WHERE id = $1")
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
