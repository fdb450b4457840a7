use async_trait::async_trait;
use uuid::Uuid;

use crate::models::billing::CustomerMapping;
use crate::models::invoice::{Invoice, InvoiceUpsert};
use crate::models::subscription::{Subscription, SubscriptionUpsert};

/// Store access for the billing rows the reconciler maintains.
///
/// Upserts are the concurrency-control strategy: last-write-wins on a fixed
/// conflict key (`member_id` for subscriptions, `stripe_invoice_id` for
/// invoices, `stripe_customer_id` for mapping backfills). Implementations must
/// use an atomic upsert primitive, not read-modify-write.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn find_customer_by_member(
        &self,
        member_id: Uuid,
    ) -> Result<Option<CustomerMapping>, sqlx::Error>;
    async fn find_member_id_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error>;
    async fn insert_customer_mapping(
        &self,
        member_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error>;
    /// Backfill path used by the reconciler; conflict key is the customer id.
    async fn upsert_customer_mapping(
        &self,
        member_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error>;

    async fn find_price_id_by_amount(
        &self,
        amount_cents: i64,
    ) -> Result<Option<String>, sqlx::Error>;
    async fn insert_price(
        &self,
        amount_cents: i64,
        stripe_price_id: &str,
    ) -> Result<(), sqlx::Error>;

    async fn find_subscription_by_member(
        &self,
        member_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error>;
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> Result<(), sqlx::Error>;
    /// Touches status (and updated_at) only; amount/period fields keep their
    /// last values. No-op when the member has no subscription row.
    async fn set_subscription_status(
        &self,
        member_id: Uuid,
        status: &str,
    ) -> Result<(), sqlx::Error>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error>;

    async fn upsert_invoice(&self, upsert: InvoiceUpsert) -> Result<(), sqlx::Error>;
    async fn list_invoices(&self) -> Result<Vec<Invoice>, sqlx::Error>;
}
