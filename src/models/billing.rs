use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Member <-> Stripe customer mapping. At most one per member; created lazily
/// on first checkout or backfilled from customer metadata by the reconciler.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CustomerMapping {
    pub member_id: Uuid,
    pub stripe_customer_id: String,
}

/// Cached Stripe price for a distinct whole-dollar monthly amount. Prices are
/// immutable once created, so this table is append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CachedPrice {
    pub amount_cents: i64,
    pub stripe_price_id: String,
}
