use super::{
    CheckoutSession, CreateCheckoutSessionRequest, PortalFlow, StripeEvent, StripeService,
    StripeServiceError, CUSTOMER_MEMBER_ID_KEY,
};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

pub struct LiveStripeService {
    client: stripe::Client,
    webhook_secret: String,
    product_id: String,
}

impl LiveStripeService {
    pub fn new(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        let client = stripe::Client::new(secret_key);
        Self {
            client,
            webhook_secret: webhook_secret.into(),
            product_id: product_id.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(
            settings.secret_key.clone(),
            settings.webhook_secret.clone(),
            settings.product_id.clone(),
        )
    }
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_customer(
        &self,
        email: &str,
        member_id: Uuid,
    ) -> Result<String, StripeServiceError> {
        let mut params = stripe::CreateCustomer::new();
        params.email = Some(email);
        params.metadata = Some(
            [(CUSTOMER_MEMBER_ID_KEY.to_string(), member_id.to_string())]
                .into_iter()
                .collect(),
        );
        let customer = stripe::Customer::create(&self.client, params).await?;
        Ok(customer.id.to_string())
    }

    async fn create_monthly_price(
        &self,
        amount_cents: i64,
    ) -> Result<String, StripeServiceError> {
        let mut params = stripe::CreatePrice::new(stripe::Currency::USD);
        params.unit_amount = Some(amount_cents);
        params.recurring = Some(stripe::CreatePriceRecurring {
            interval: stripe::CreatePriceRecurringInterval::Month,
            ..Default::default()
        });
        params.product = Some(stripe::IdOrCreate::Id(&self.product_id));
        params.metadata = Some(
            [(
                "amount_dollars".to_string(),
                (amount_cents / 100).to_string(),
            )]
            .into_iter()
            .collect(),
        );
        let price = stripe::Price::create(&self.client, params).await?;
        Ok(price.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, StripeServiceError> {
        let cid = req
            .customer
            .parse::<stripe::CustomerId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Subscription);
        params.customer = Some(cid);
        params.success_url = Some(&req.success_url);
        params.cancel_url = Some(&req.cancel_url);
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(req.price.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        let mut metadata = HashMap::new();
        metadata.insert(
            CUSTOMER_MEMBER_ID_KEY.to_string(),
            req.member_id.to_string(),
        );
        params.metadata = Some(metadata);

        let session = stripe::CheckoutSession::create(&self.client, params).await?;
        Ok(CheckoutSession {
            id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
        flow: PortalFlow,
    ) -> Result<String, StripeServiceError> {
        let cid = customer_id
            .parse::<stripe::CustomerId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;

        let mut params = stripe::CreateBillingPortalSession::new(cid);
        params.return_url = Some(return_url);

        match flow {
            PortalFlow::None => {}
            PortalFlow::PaymentMethodUpdate => {
                params.flow_data = Some(stripe::CreateBillingPortalSessionFlowData {
                    type_: stripe::CreateBillingPortalSessionFlowDataType::PaymentMethodUpdate,
                    ..Default::default()
                });
            }
            PortalFlow::SubscriptionCancel { subscription_id } => {
                params.flow_data = Some(stripe::CreateBillingPortalSessionFlowData {
                    type_: stripe::CreateBillingPortalSessionFlowDataType::SubscriptionCancel,
                    subscription_cancel: Some(
                        stripe::CreateBillingPortalSessionFlowDataSubscriptionCancel {
                            subscription: subscription_id,
                            ..Default::default()
                        },
                    ),
                    ..Default::default()
                });
            }
        }

        let session = stripe::BillingPortalSession::create(&self.client, params).await?;
        Ok(session.url)
    }

    async fn change_subscription_price(
        &self,
        subscription_id: &str,
        price_id: &str,
    ) -> Result<(), StripeServiceError> {
        let sub_id = subscription_id
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;

        // The sole line item's id is needed to swap its price in place.
        let current = stripe::Subscription::retrieve(&self.client, &sub_id, &[]).await?;
        let item = current.items.data.first().ok_or_else(|| {
            StripeServiceError::NotFound(format!(
                "subscription {} has no line items",
                subscription_id
            ))
        })?;

        let mut params = stripe::UpdateSubscription::new();
        params.items = Some(vec![stripe::UpdateSubscriptionItems {
            id: Some(item.id.to_string()),
            price: Some(price_id.to_string()),
            ..Default::default()
        }]);
        params.proration_behavior =
            Some(stripe::generated::billing::subscription::SubscriptionProrationBehavior::None);

        stripe::Subscription::update(&self.client, &sub_id, params).await?;
        Ok(())
    }

    async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<(), StripeServiceError> {
        let sub_id = subscription_id
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;
        stripe::Subscription::cancel(&self.client, &sub_id, Default::default()).await?;
        Ok(())
    }

    async fn find_member_id_in_customer_metadata(
        &self,
        customer_id: &str,
    ) -> Result<Option<Uuid>, StripeServiceError> {
        let cid = customer_id
            .parse::<stripe::CustomerId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;
        let customer = stripe::Customer::retrieve(&self.client, &cid, &[]).await?;
        if customer.deleted {
            return Ok(None);
        }
        Ok(customer
            .metadata
            .as_ref()
            .and_then(|m| m.get(CUSTOMER_MEMBER_ID_KEY))
            .and_then(|v| Uuid::parse_str(v).ok()))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        let payload_str =
            std::str::from_utf8(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let event =
            stripe::Webhook::construct_event(payload_str, signature_header, &self.webhook_secret)?;
        let payload =
            serde_json::to_value(&event).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        Ok(StripeEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }
}
