use axum::Json;
use axum::{extract::State, http::HeaderMap};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::invoice::InvoiceUpsert;
use crate::models::subscription::SubscriptionUpsert;
use crate::state::AppState;

// Small helper: nested json lookup
fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn extract_i64(val: &Value, path: &[&str]) -> Option<i64> {
    jget(val, path)?.as_i64()
}

fn extract_bool(val: &Value, path: &[&str]) -> Option<bool> {
    jget(val, path)?.as_bool()
}

fn extract_customer_id(event: &Value) -> Option<String> {
    extract_str(event, &["data", "object", "customer"]).map(|s| s.to_string())
}

fn epoch_to_timestamp(secs: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs).ok()
}

// POST /api/stripe/webhook
//
// The only authenticity check is the signature; after that, business-level
// problems (unknown event type, unmapped customer) are acknowledged rather
// than rejected, because the sender retries on any non-2xx and retrying
// cannot fix them. Handler failures for known event types DO propagate, so
// the sender retries those.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, ApiError> {
    let sig = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::BadSignature("Missing Stripe-Signature header".into()))?;

    let event = state.stripe.verify_webhook(&body, sig).map_err(|err| {
        warn!(?err, "webhook verification failed");
        ApiError::from(err)
    })?;

    let event_type = event.r#type.as_str();
    let payload = &event.payload;

    match event_type {
        // The subscription.created event arriving alongside carries the
        // actual state transition.
        "checkout.session.completed" => {
            info!(event_id = %event.id, "checkout completed; awaiting subscription event");
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_upsert(&state, event_type, payload).await?;
        }
        "customer.subscription.deleted" => {
            handle_subscription_deleted(&state, payload).await?;
        }
        "invoice.paid" => {
            handle_invoice_paid(&state, payload).await?;
        }
        "invoice.payment_failed" => {
            handle_invoice_payment_failed(&state, payload).await?;
        }
        _ => {
            info!(event_type, "unhandled event acknowledged");
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// Resolves a processor customer id to a member id. The mapping table is
/// authoritative; when it misses, the customer's metadata tag (written at
/// creation time) is consulted and the mapping backfilled from it. Events
/// for customers neither source knows are dropped: retrying cannot recover
/// them.
async fn member_id_from_customer(
    state: &AppState,
    customer_id: &str,
) -> Result<Option<Uuid>, ApiError> {
    if let Some(member_id) = state.billing.find_member_id_by_customer(customer_id).await? {
        return Ok(Some(member_id));
    }

    match state
        .stripe
        .find_member_id_in_customer_metadata(customer_id)
        .await?
    {
        Some(member_id) => {
            state
                .billing
                .upsert_customer_mapping(member_id, customer_id)
                .await?;
            info!(%member_id, customer_id, "backfilled customer mapping from metadata");
            Ok(Some(member_id))
        }
        None => {
            warn!(customer_id, "event for unmapped customer dropped");
            Ok(None)
        }
    }
}

/// Last-delivered-wins upsert keyed by member id. Every field is written
/// unconditionally; no version or timestamp check against the existing row.
async fn handle_subscription_upsert(
    state: &AppState,
    event_type: &str,
    payload: &Value,
) -> Result<(), ApiError> {
    let customer_id = match extract_customer_id(payload) {
        Some(id) => id,
        None => {
            warn!(event_type, "subscription event missing customer id");
            return Ok(());
        }
    };
    let member_id = match member_id_from_customer(state, &customer_id).await? {
        Some(id) => id,
        None => return Ok(()),
    };

    let obj_path = ["data", "object"];
    let stripe_subscription_id = match extract_str(payload, &["data", "object", "id"]) {
        Some(id) => id.to_string(),
        None => {
            warn!(event_type, "subscription event missing subscription id");
            return Ok(());
        }
    };
    // Processor-defined status strings pass through verbatim.
    let status = extract_str(payload, &["data", "object", "status"])
        .unwrap_or("unknown")
        .to_string();
    let item = jget(payload, &obj_path)
        .and_then(|o| jget(o, &["items", "data"]))
        .and_then(|d| d.get(0));
    let current_amount_cents = item
        .and_then(|i| extract_i64(i, &["price", "unit_amount"]))
        .unwrap_or(0);
    let currency = item
        .and_then(|i| extract_str(i, &["price", "currency"]))
        .unwrap_or("usd")
        .to_string();
    let current_period_end = extract_i64(payload, &["data", "object", "current_period_end"])
        .and_then(epoch_to_timestamp);
    let cancel_at_period_end =
        extract_bool(payload, &["data", "object", "cancel_at_period_end"]).unwrap_or(false);

    state
        .billing
        .upsert_subscription(SubscriptionUpsert {
            member_id,
            stripe_subscription_id,
            status: status.clone(),
            current_amount_cents,
            currency,
            current_period_end,
            cancel_at_period_end,
        })
        .await?;

    info!(%member_id, status, current_amount_cents, event_type, "subscription row upserted");
    Ok(())
}

/// Marks the subscription canceled. Amount and period fields keep their
/// last-known values.
async fn handle_subscription_deleted(state: &AppState, payload: &Value) -> Result<(), ApiError> {
    let customer_id = match extract_customer_id(payload) {
        Some(id) => id,
        None => {
            warn!("subscription deletion missing customer id");
            return Ok(());
        }
    };
    let member_id = match member_id_from_customer(state, &customer_id).await? {
        Some(id) => id,
        None => return Ok(()),
    };

    state
        .billing
        .set_subscription_status(member_id, "canceled")
        .await?;
    info!(%member_id, "subscription marked canceled");
    Ok(())
}

async fn handle_invoice_paid(state: &AppState, payload: &Value) -> Result<(), ApiError> {
    let customer_id = match extract_customer_id(payload) {
        Some(id) => id,
        None => {
            warn!("invoice.paid missing customer id");
            return Ok(());
        }
    };
    let member_id = match member_id_from_customer(state, &customer_id).await? {
        Some(id) => id,
        None => return Ok(()),
    };
    let stripe_invoice_id = match extract_str(payload, &["data", "object", "id"]) {
        Some(id) => id.to_string(),
        None => {
            warn!("invoice.paid missing invoice id");
            return Ok(());
        }
    };

    let amount_paid_cents =
        extract_i64(payload, &["data", "object", "amount_paid"]).unwrap_or(0);
    let hosted_invoice_url = extract_str(payload, &["data", "object", "hosted_invoice_url"])
        .map(|s| s.to_string());
    let invoice_pdf =
        extract_str(payload, &["data", "object", "invoice_pdf"]).map(|s| s.to_string());
    let created_at = extract_i64(payload, &["data", "object", "created"])
        .and_then(epoch_to_timestamp)
        .unwrap_or_else(OffsetDateTime::now_utc);

    state
        .billing
        .upsert_invoice(InvoiceUpsert {
            member_id,
            stripe_invoice_id: stripe_invoice_id.clone(),
            amount_paid_cents,
            status: "paid".into(),
            hosted_invoice_url,
            invoice_pdf,
            created_at,
        })
        .await?;

    info!(%member_id, stripe_invoice_id, amount_paid_cents, "invoice recorded as paid");
    Ok(())
}

/// Failed renewal: flip the subscription to past_due and record a
/// zero-amount failed invoice. A later genuine retry of the same invoice
/// arrives as invoice.paid and overwrites this row via the shared key.
async fn handle_invoice_payment_failed(state: &AppState, payload: &Value) -> Result<(), ApiError> {
    let customer_id = match extract_customer_id(payload) {
        Some(id) => id,
        None => {
            warn!("invoice.payment_failed missing customer id");
            return Ok(());
        }
    };
    let member_id = match member_id_from_customer(state, &customer_id).await? {
        Some(id) => id,
        None => return Ok(()),
    };

    state
        .billing
        .set_subscription_status(member_id, "past_due")
        .await?;

    if let Some(stripe_invoice_id) = extract_str(payload, &["data", "object", "id"]) {
        let hosted_invoice_url = extract_str(payload, &["data", "object", "hosted_invoice_url"])
            .map(|s| s.to_string());
        let created_at = extract_i64(payload, &["data", "object", "created"])
            .and_then(epoch_to_timestamp)
            .unwrap_or_else(OffsetDateTime::now_utc);

        state
            .billing
            .upsert_invoice(InvoiceUpsert {
                member_id,
                stripe_invoice_id: stripe_invoice_id.to_string(),
                amount_paid_cents: 0,
                status: "failed".into(),
                hosted_invoice_url,
                invoice_pdf: None,
                created_at,
            })
            .await?;
    } else {
        warn!(%member_id, "invoice.payment_failed missing invoice id; status updated only");
    }

    warn!(%member_id, "renewal payment failed; subscription marked past_due");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::billing_repository::BillingRepository;
    use crate::db::mock_db::{MockBillingRepo, MockMemberRepo};
    use crate::models::member::MemberRole;
    use crate::models::subscription::Subscription;
    use crate::routes::test_support::{make_member, test_state};
    use crate::services::identity::MockIdentityService;
    use crate::services::stripe::MockStripeService;
    use axum::extract::State as AxumState;
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::IntoResponse;
    use std::sync::Arc;

    fn signed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_static("t=1,v1=stub"));
        headers
    }

    fn subscription_event(
        event_type: &str,
        customer: &str,
        sub_id: &str,
        status: &str,
        amount_cents: i64,
    ) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": format!("evt_{}_{}", sub_id, amount_cents),
            "type": event_type,
            "data": { "object": {
                "id": sub_id,
                "customer": customer,
                "status": status,
                "cancel_at_period_end": false,
                "current_period_end": 1_767_225_600,
                "items": { "data": [ { "price": { "unit_amount": amount_cents, "currency": "usd" } } ] }
            } }
        }))
        .unwrap()
    }

    fn paid_invoice_event(customer: &str, invoice_id: &str, amount_cents: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": format!("evt_{}", invoice_id),
            "type": "invoice.paid",
            "data": { "object": {
                "id": invoice_id,
                "customer": customer,
                "amount_paid": amount_cents,
                "hosted_invoice_url": "https://pay.example.test/inv",
                "invoice_pdf": "https://pay.example.test/inv.pdf",
                "created": 1_764_547_200
            } }
        }))
        .unwrap()
    }

    async fn deliver(state: &AppState, body: Vec<u8>) -> StatusCode {
        let result = webhook(
            AxumState(state.clone()),
            signed_headers(),
            axum::body::Bytes::from(body),
        )
        .await;
        match result {
            Ok(resp) => resp.into_response().status(),
            Err(err) => err.status(),
        }
    }

    fn state_with_mapping(
        customer: &str,
    ) -> (AppState, Arc<MockBillingRepo>, Uuid) {
        let member = make_member(MemberRole::Member);
        let billing = Arc::new(MockBillingRepo::new());
        billing.seed_customer(member.id, customer);
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![member.clone()])),
            billing.clone(),
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new()),
        );
        (state, billing, member.id)
    }

    #[tokio::test]
    async fn subscription_created_writes_full_row() {
        let (state, billing, member_id) = state_with_mapping("cus_1");

        let status = deliver(
            &state,
            subscription_event("customer.subscription.created", "cus_1", "sub_1", "active", 4200),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let subs = billing.subscriptions.lock().unwrap();
        let sub = subs.get(&member_id).unwrap();
        assert_eq!(sub.stripe_subscription_id, "sub_1");
        assert_eq!(sub.status, "active");
        assert_eq!(sub.current_amount_cents, 4200);
        assert_eq!(sub.currency, "usd");
        assert!(sub.current_period_end.is_some());
        assert!(!sub.cancel_at_period_end);
    }

    #[tokio::test]
    async fn subscription_event_without_subscription_id_writes_nothing() {
        let (state, billing, _member_id) = state_with_mapping("cus_1");

        let body = serde_json::to_vec(&json!({
            "id": "evt_noid",
            "type": "customer.subscription.updated",
            "data": { "object": {
                "customer": "cus_1",
                "status": "active",
                "items": { "data": [ { "price": { "unit_amount": 4200, "currency": "usd" } } ] }
            } }
        }))
        .unwrap();
        assert_eq!(deliver(&state, body).await, StatusCode::OK);
        assert!(billing.subscriptions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_updates_reflect_last_delivered_event() {
        let (state, billing, member_id) = state_with_mapping("cus_1");

        // The "newer" event lands first, the stale one second. Last delivery
        // wins; chronology is not consulted.
        deliver(
            &state,
            subscription_event("customer.subscription.updated", "cus_1", "sub_1", "active", 10000),
        )
        .await;
        deliver(
            &state,
            subscription_event("customer.subscription.updated", "cus_1", "sub_1", "active", 5000),
        )
        .await;

        let subs = billing.subscriptions.lock().unwrap();
        assert_eq!(subs.get(&member_id).unwrap().current_amount_cents, 5000);
    }

    #[tokio::test]
    async fn replayed_invoice_paid_yields_one_row() {
        let (state, billing, member_id) = state_with_mapping("cus_1");

        let body = paid_invoice_event("cus_1", "in_1", 4200);
        assert_eq!(deliver(&state, body.clone()).await, StatusCode::OK);
        assert_eq!(deliver(&state, body).await, StatusCode::OK);

        let invoices = billing.invoices.lock().unwrap();
        assert_eq!(invoices.len(), 1);
        let inv = invoices.get("in_1").unwrap();
        assert_eq!(inv.member_id, member_id);
        assert_eq!(inv.amount_paid_cents, 4200);
        assert_eq!(inv.status, "paid");
    }

    #[tokio::test]
    async fn payment_failed_marks_past_due_and_records_failed_invoice() {
        let (state, billing, member_id) = state_with_mapping("cus_1");
        billing.seed_subscription(Subscription {
            member_id,
            stripe_subscription_id: "sub_1".into(),
            status: "active".into(),
            current_amount_cents: 4200,
            currency: "usd".into(),
            current_period_end: None,
            cancel_at_period_end: false,
            updated_at: OffsetDateTime::now_utc(),
        });

        let body = serde_json::to_vec(&json!({
            "id": "evt_fail",
            "type": "invoice.payment_failed",
            "data": { "object": {
                "id": "in_fail",
                "customer": "cus_1",
                "created": 1_764_547_200
            } }
        }))
        .unwrap();
        assert_eq!(deliver(&state, body).await, StatusCode::OK);

        let subs = billing.subscriptions.lock().unwrap();
        assert_eq!(subs.get(&member_id).unwrap().status, "past_due");

        let invoices = billing.invoices.lock().unwrap();
        let inv = invoices.get("in_fail").unwrap();
        assert_eq!(inv.amount_paid_cents, 0);
        assert_eq!(inv.status, "failed");
    }

    #[tokio::test]
    async fn retried_invoice_paid_overwrites_failed_row_in_place() {
        let (state, billing, _member_id) = state_with_mapping("cus_1");

        let failed = serde_json::to_vec(&json!({
            "id": "evt_fail",
            "type": "invoice.payment_failed",
            "data": { "object": { "id": "in_retry", "customer": "cus_1" } }
        }))
        .unwrap();
        deliver(&state, failed).await;
        deliver(&state, paid_invoice_event("cus_1", "in_retry", 4200)).await;

        let invoices = billing.invoices.lock().unwrap();
        assert_eq!(invoices.len(), 1);
        let inv = invoices.get("in_retry").unwrap();
        assert_eq!(inv.status, "paid");
        assert_eq!(inv.amount_paid_cents, 4200);
    }

    #[tokio::test]
    async fn subscription_deleted_cancels_but_preserves_amount() {
        let (state, billing, member_id) = state_with_mapping("cus_1");
        billing.seed_subscription(Subscription {
            member_id,
            stripe_subscription_id: "sub_1".into(),
            status: "active".into(),
            current_amount_cents: 7500,
            currency: "usd".into(),
            current_period_end: None,
            cancel_at_period_end: true,
            updated_at: OffsetDateTime::now_utc(),
        });

        let body = serde_json::to_vec(&json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1", "customer": "cus_1" } }
        }))
        .unwrap();
        assert_eq!(deliver(&state, body).await, StatusCode::OK);

        let subs = billing.subscriptions.lock().unwrap();
        let sub = subs.get(&member_id).unwrap();
        assert_eq!(sub.status, "canceled");
        assert_eq!(sub.current_amount_cents, 7500);
    }

    #[tokio::test]
    async fn invalid_signature_rejects_without_store_mutation() {
        let member = make_member(MemberRole::Member);
        let billing = Arc::new(MockBillingRepo::new());
        billing.seed_customer(member.id, "cus_1");
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![member])),
            billing.clone(),
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new().with_failing_verification()),
        );

        let status = deliver(
            &state,
            subscription_event("customer.subscription.created", "cus_1", "sub_1", "active", 4200),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(billing.subscriptions.lock().unwrap().is_empty());
        assert!(billing.invoices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let (state, billing, _member_id) = state_with_mapping("cus_1");

        let result = webhook(
            AxumState(state),
            HeaderMap::new(),
            axum::body::Bytes::from(paid_invoice_event("cus_1", "in_1", 100)),
        )
        .await;
        assert_eq!(result.unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert!(billing.invoices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmapped_customer_with_metadata_tag_backfills_mapping() {
        let member = make_member(MemberRole::Member);
        let billing = Arc::new(MockBillingRepo::new());
        let stripe = Arc::new(MockStripeService::new());
        stripe.tag_customer("cus_untracked", member.id);
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![member.clone()])),
            billing.clone(),
            Arc::new(MockIdentityService::new()),
            stripe,
        );

        let status = deliver(
            &state,
            subscription_event(
                "customer.subscription.created",
                "cus_untracked",
                "sub_1",
                "active",
                3000,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Mapping backfilled and row written
        assert_eq!(
            billing
                .find_member_id_by_customer("cus_untracked")
                .await
                .unwrap(),
            Some(member.id)
        );
        assert!(billing.subscriptions.lock().unwrap().contains_key(&member.id));
    }

    #[tokio::test]
    async fn unmapped_customer_without_tag_is_acknowledged_and_dropped() {
        let billing = Arc::new(MockBillingRepo::new());
        let state = test_state(
            Arc::new(MockMemberRepo::default()),
            billing.clone(),
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new()),
        );

        let status = deliver(
            &state,
            subscription_event("customer.subscription.created", "cus_ghost", "sub_1", "active", 3000),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(billing.subscriptions.lock().unwrap().is_empty());
        assert!(billing.customers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_event_type_is_acknowledged() {
        let (state, billing, _member_id) = state_with_mapping("cus_1");

        let body = serde_json::to_vec(&json!({
            "id": "evt_odd",
            "type": "customer.tax_id.created",
            "data": { "object": { "customer": "cus_1" } }
        }))
        .unwrap();
        assert_eq!(deliver(&state, body).await, StatusCode::OK);
        assert!(billing.subscriptions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_completion_is_logged_only() {
        let (state, billing, _member_id) = state_with_mapping("cus_1");

        let body = serde_json::to_vec(&json!({
            "id": "evt_cs",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "customer": "cus_1" } }
        }))
        .unwrap();
        assert_eq!(deliver(&state, body).await, StatusCode::OK);
        assert!(billing.subscriptions.lock().unwrap().is_empty());
        assert!(billing.invoices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_on_known_event_propagates_for_retry() {
        let member = make_member(MemberRole::Member);
        let billing = Arc::new(MockBillingRepo {
            should_fail: true,
            ..Default::default()
        });
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![member])),
            billing,
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new()),
        );

        let status = deliver(
            &state,
            subscription_event("customer.subscription.created", "cus_1", "sub_1", "active", 4200),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
