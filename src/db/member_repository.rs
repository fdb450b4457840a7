use async_trait::async_trait;
use uuid::Uuid;

use crate::models::member::Member;

#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn find_member_by_id(&self, member_id: Uuid) -> Result<Option<Member>, sqlx::Error>;
    async fn list_members(&self) -> Result<Vec<Member>, sqlx::Error>;
    async fn set_member_active(&self, member_id: Uuid, is_active: bool)
        -> Result<(), sqlx::Error>;
    async fn mark_setup_completed(&self, member_id: Uuid) -> Result<(), sqlx::Error>;
}
