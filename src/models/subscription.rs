use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// At most one row per member. `member_id` is the upsert conflict key, so a
/// second processor subscription for the same member overwrites the first.
/// Fields reflect the last webhook event received, not necessarily the
/// chronologically latest processor state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub member_id: Uuid,
    pub stripe_subscription_id: String,
    /// Processor status passed through verbatim (active, trialing, past_due,
    /// canceled, ...).
    pub status: String,
    pub current_amount_cents: i64,
    pub currency: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Statuses that count as "already subscribed" when starting a new checkout.
pub const BLOCKING_STATUSES: [&str; 3] = ["active", "trialing", "past_due"];

#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub member_id: Uuid,
    pub stripe_subscription_id: String,
    pub status: String,
    pub current_amount_cents: i64,
    pub currency: String,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
}
