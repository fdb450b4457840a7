#![allow(dead_code)]
use super::{
    CheckoutSession, CreateCheckoutSessionRequest, PortalFlow, StripeEvent, StripeService,
    StripeServiceError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MockStripeService {
    pub created_customers: Arc<Mutex<Vec<(String, Uuid)>>>,
    pub created_prices: Arc<Mutex<Vec<i64>>>,
    pub checkout_requests: Arc<Mutex<Vec<CreateCheckoutSessionRequest>>>,
    pub portal_requests: Arc<Mutex<Vec<(String, String, PortalFlow)>>>,
    pub price_changes: Arc<Mutex<Vec<(String, String)>>>,
    pub cancellations: Arc<Mutex<Vec<String>>>,
    /// Processor-side customer metadata tags, for backfill tests.
    pub customer_metadata: Arc<Mutex<HashMap<String, Uuid>>>,
    pub fail_verification: Arc<Mutex<bool>>,
    pub fail_cancellation: Arc<Mutex<bool>>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_verification(self) -> Self {
        *self.fail_verification.lock().unwrap() = true;
        self
    }

    pub fn with_failing_cancellation(self) -> Self {
        *self.fail_cancellation.lock().unwrap() = true;
        self
    }

    pub fn tag_customer(&self, customer_id: &str, member_id: Uuid) {
        self.customer_metadata
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), member_id);
    }
}

fn make_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}_{}", prefix, ts)
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_customer(
        &self,
        email: &str,
        member_id: Uuid,
    ) -> Result<String, StripeServiceError> {
        let id = make_id("cus_test");
        self.created_customers
            .lock()
            .unwrap()
            .push((email.to_string(), member_id));
        // mirror the live tagging so backfill lookups behave the same
        self.customer_metadata
            .lock()
            .unwrap()
            .insert(id.clone(), member_id);
        Ok(id)
    }

    async fn create_monthly_price(
        &self,
        amount_cents: i64,
    ) -> Result<String, StripeServiceError> {
        self.created_prices.lock().unwrap().push(amount_cents);
        Ok(format!("price_test_{}", amount_cents))
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        self.checkout_requests.lock().unwrap().push(req);
        Ok(CheckoutSession {
            id: make_id("cs_test"),
            url: Some("https://example.test/checkout".into()),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
        flow: PortalFlow,
    ) -> Result<String, StripeServiceError> {
        self.portal_requests.lock().unwrap().push((
            customer_id.to_string(),
            return_url.to_string(),
            flow,
        ));
        Ok("https://example.test/portal".into())
    }

    async fn change_subscription_price(
        &self,
        subscription_id: &str,
        price_id: &str,
    ) -> Result<(), StripeServiceError> {
        self.price_changes
            .lock()
            .unwrap()
            .push((subscription_id.to_string(), price_id.to_string()));
        Ok(())
    }

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<(), StripeServiceError> {
        if *self.fail_cancellation.lock().unwrap() {
            return Err(StripeServiceError::Api(
                "subscription already canceled".into(),
            ));
        }
        self.cancellations
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(())
    }

    async fn find_member_id_in_customer_metadata(
        &self,
        customer_id: &str,
    ) -> Result<Option<Uuid>, StripeServiceError> {
        Ok(self
            .customer_metadata
            .lock()
            .unwrap()
            .get(customer_id)
            .copied())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        if *self.fail_verification.lock().unwrap() {
            return Err(StripeServiceError::Webhook(
                "signature verification failed".into(),
            ));
        }
        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let id = match val.get("id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => make_id("evt"),
        };
        let ty = val
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(StripeEvent {
            id,
            r#type: ty,
            payload: val,
        })
    }
}
