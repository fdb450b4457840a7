#![allow(dead_code)]
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::billing_repository::BillingRepository;
use crate::db::member_repository::MemberRepository;
use crate::models::billing::CustomerMapping;
use crate::models::invoice::{Invoice, InvoiceUpsert};
use crate::models::member::Member;
use crate::models::subscription::{Subscription, SubscriptionUpsert};

/// In-memory MemberRepository for tests.
#[derive(Default)]
pub struct MockMemberRepo {
    pub members: Mutex<Vec<Member>>,
    pub active_updates: Mutex<Vec<(Uuid, bool)>>,
    pub setup_completions: Mutex<Vec<Uuid>>,
    pub should_fail: bool,
}

impl MockMemberRepo {
    pub fn with_members(members: Vec<Member>) -> Self {
        Self {
            members: Mutex::new(members),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MemberRepository for MockMemberRepo {
    async fn find_member_by_id(&self, member_id: Uuid) -> Result<Option<Member>, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock member repo failure".into()));
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == member_id)
            .cloned())
    }

    async fn list_members(&self) -> Result<Vec<Member>, sqlx::Error> {
        Ok(self.members.lock().unwrap().clone())
    }

    async fn set_member_active(
        &self,
        member_id: Uuid,
        is_active: bool,
    ) -> Result<(), sqlx::Error> {
        self.active_updates
            .lock()
            .unwrap()
            .push((member_id, is_active));
        if let Some(m) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.id == member_id)
        {
            m.is_active = is_active;
        }
        Ok(())
    }

    async fn mark_setup_completed(&self, member_id: Uuid) -> Result<(), sqlx::Error> {
        self.setup_completions.lock().unwrap().push(member_id);
        if let Some(m) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.id == member_id)
        {
            m.setup_completed = true;
        }
        Ok(())
    }
}

/// In-memory BillingRepository mirroring the conflict-key semantics of the
/// Postgres implementation: subscriptions keyed by member id, invoices by
/// processor invoice id, customer backfills by customer id.
#[derive(Default)]
pub struct MockBillingRepo {
    pub customers: Mutex<Vec<CustomerMapping>>,
    pub prices: Mutex<HashMap<i64, String>>,
    pub subscriptions: Mutex<HashMap<Uuid, Subscription>>,
    pub invoices: Mutex<HashMap<String, Invoice>>,
    pub customer_upserts: Mutex<usize>,
    pub should_fail: bool,
}

impl MockBillingRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_customer(&self, member_id: Uuid, customer_id: &str) {
        self.customers.lock().unwrap().push(CustomerMapping {
            member_id,
            stripe_customer_id: customer_id.to_string(),
        });
    }

    pub fn seed_subscription(&self, sub: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(sub.member_id, sub);
    }
}

#[async_trait]
impl BillingRepository for MockBillingRepo {
    async fn find_customer_by_member(
        &self,
        member_id: Uuid,
    ) -> Result<Option<CustomerMapping>, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock billing repo failure".into()));
        }
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.member_id == member_id)
            .cloned())
    }

    async fn find_member_id_by_customer(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock billing repo failure".into()));
        }
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.stripe_customer_id == stripe_customer_id)
            .map(|c| c.member_id))
    }

    async fn insert_customer_mapping(
        &self,
        member_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        self.customers.lock().unwrap().push(CustomerMapping {
            member_id,
            stripe_customer_id: stripe_customer_id.to_string(),
        });
        Ok(())
    }

    async fn upsert_customer_mapping(
        &self,
        member_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        *self.customer_upserts.lock().unwrap() += 1;
        let mut customers = self.customers.lock().unwrap();
        if let Some(existing) = customers
            .iter_mut()
            .find(|c| c.stripe_customer_id == stripe_customer_id)
        {
            existing.member_id = member_id;
        } else {
            customers.push(CustomerMapping {
                member_id,
                stripe_customer_id: stripe_customer_id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_price_id_by_amount(
        &self,
        amount_cents: i64,
    ) -> Result<Option<String>, sqlx::Error> {
        Ok(self.prices.lock().unwrap().get(&amount_cents).cloned())
    }

    async fn insert_price(
        &self,
        amount_cents: i64,
        stripe_price_id: &str,
    ) -> Result<(), sqlx::Error> {
        self.prices
            .lock()
            .unwrap()
            .insert(amount_cents, stripe_price_id.to_string());
        Ok(())
    }

    async fn find_subscription_by_member(
        &self,
        member_id: Uuid,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock billing repo failure".into()));
        }
        Ok(self.subscriptions.lock().unwrap().get(&member_id).cloned())
    }

    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock billing repo failure".into()));
        }
        let sub = Subscription {
            member_id: upsert.member_id,
            stripe_subscription_id: upsert.stripe_subscription_id,
            status: upsert.status,
            current_amount_cents: upsert.current_amount_cents,
            currency: upsert.currency,
            current_period_end: upsert.current_period_end,
            cancel_at_period_end: upsert.cancel_at_period_end,
            updated_at: OffsetDateTime::now_utc(),
        };
        self.subscriptions
            .lock()
            .unwrap()
            .insert(upsert.member_id, sub);
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        member_id: Uuid,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        if let Some(sub) = self.subscriptions.lock().unwrap().get_mut(&member_id) {
            sub.status = status.to_string();
            sub.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect())
    }

    async fn upsert_invoice(&self, upsert: InvoiceUpsert) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock billing repo failure".into()));
        }
        let invoice = Invoice {
            member_id: upsert.member_id,
            stripe_invoice_id: upsert.stripe_invoice_id.clone(),
            amount_paid_cents: upsert.amount_paid_cents,
            status: upsert.status,
            hosted_invoice_url: upsert.hosted_invoice_url,
            invoice_pdf: upsert.invoice_pdf,
            created_at: upsert.created_at,
        };
        self.invoices
            .lock()
            .unwrap()
            .insert(upsert.stripe_invoice_id, invoice);
        Ok(())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, sqlx::Error> {
        Ok(self.invoices.lock().unwrap().values().cloned().collect())
    }
}
