use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, FromRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "member_role")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Admin,
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberRole::Member => "member",
            MemberRole::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

/// One row per authenticated identity. The id is owned by the identity
/// provider; deactivation is a soft flag, rows are never hard-deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Member {
    pub id: uuid::Uuid,
    pub email: String,
    pub role: MemberRole,
    pub is_active: bool,
    pub setup_completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}
