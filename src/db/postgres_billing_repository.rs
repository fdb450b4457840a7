use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::billing_repository::BillingRepository;
use crate::models::billing::CustomerMapping;
use crate::models::invoice::{Invoice, InvoiceUpsert};
use crate::models::subscription::{Subscription, SubscriptionUpsert};

pub struct PostgresBillingRepository {
    pub pool: PgPool,
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn find_customer_by_member(
        &self,
        member_id: Uuid,
    ) -> Result<Option<CustomerMapping>, sqlx::Error> {
        sqlx::query_as::<_, CustomerMapping>(
            "SELECT member_id, stripe_customer_id FROM stripe_customers WHERE member_id = $1",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_member_id_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let row = sqlx::query_as::<_, CustomerMapping>(
            "SELECT member_id, stripe_customer_id FROM stripe_customers WHERE stripe_customer_id = $1",
        )
        .bind(stripe_customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|m| m.member_id))
    }

    async fn insert_customer_mapping(
        &self,
        member_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO stripe_customers (member_id, stripe_customer_id) VALUES ($1, $2)",
        )
        .bind(member_id)
        .bind(stripe_customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_customer_mapping(
        &self,
        member_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO stripe_customers (member_id, stripe_customer_id)
            VALUES ($1, $2)
            ON CONFLICT (stripe_customer_id) DO UPDATE
            SET member_id = EXCLUDED.member_id
            "#,
        )
        .bind(member_id)
        .bind(stripe_customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_price_id_by_amount(
        &self,
        amount_cents: i64,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query_as::<_, crate::models::billing::CachedPrice>(
            "SELECT amount_cents, stripe_price_id FROM stripe_prices WHERE amount_cents = $1",
        )
        .bind(amount_cents)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|p| p.stripe_price_id))
    }

    async fn insert_price(
        &self,
        amount_cents: i64,
        stripe_price_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO stripe_prices (amount_cents, stripe_price_id) VALUES ($1, $2)")
            .bind(amount_cents)
            .bind(stripe_price_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_subscription_by_member(
        &self,
        member_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT member_id, stripe_subscription_id, status, current_amount_cents,
                   currency, current_period_end, cancel_at_period_end, updated_at
            FROM subscriptions
            WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                member_id, stripe_subscription_id, status, current_amount_cents,
                currency, current_period_end, cancel_at_period_end, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (member_id) DO UPDATE
            SET stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                status = EXCLUDED.status,
                current_amount_cents = EXCLUDED.current_amount_cents,
                currency = EXCLUDED.currency,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = now()
            "#,
        )
        .bind(upsert.member_id)
        .bind(&upsert.stripe_subscription_id)
        .bind(&upsert.status)
        .bind(upsert.current_amount_cents)
        .bind(&upsert.currency)
        .bind(upsert.current_period_end)
        .bind(upsert.cancel_at_period_end)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        member_id: Uuid,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_at = now() WHERE member_id = $1",
        )
        .bind(member_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT member_id, stripe_subscription_id, status, current_amount_cents,
                   currency, current_period_end, cancel_at_period_end, updated_at
            FROM subscriptions
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn upsert_invoice(&self, upsert: InvoiceUpsert) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                member_id, stripe_invoice_id, amount_paid_cents, status,
                hosted_invoice_url, invoice_pdf, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (stripe_invoice_id) DO UPDATE
            SET member_id = EXCLUDED.member_id,
                amount_paid_cents = EXCLUDED.amount_paid_cents,
                status = EXCLUDED.status,
                hosted_invoice_url = EXCLUDED.hosted_invoice_url,
                invoice_pdf = EXCLUDED.invoice_pdf,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(upsert.member_id)
        .bind(&upsert.stripe_invoice_id)
        .bind(upsert.amount_paid_cents)
        .bind(&upsert.status)
        .bind(&upsert.hosted_invoice_url)
        .bind(&upsert.invoice_pdf)
        .bind(upsert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, sqlx::Error> {
        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT member_id, stripe_invoice_id, amount_paid_cents, status,
                   hosted_invoice_url, invoice_pdf, created_at
            FROM invoices
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}
