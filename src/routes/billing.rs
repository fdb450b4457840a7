use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::ApiError;
use crate::models::member::Member;
use crate::models::subscription::BLOCKING_STATUSES;
use crate::routes::auth::AuthMember;
use crate::services::stripe::{CreateCheckoutSessionRequest, PortalFlow};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount_dollars: f64,
}

#[derive(Deserialize)]
pub struct PortalRequest {
    pub flow_type: Option<String>,
}

/// Validates the whole-dollar contribution amount and converts it to cents.
fn amount_to_cents(state: &AppState, amount_dollars: f64) -> Result<i64, ApiError> {
    let min = state.config.contribution.min_dollars;
    let max = state.config.contribution.max_dollars;
    if !amount_dollars.is_finite() || amount_dollars.fract() != 0.0 {
        return Err(ApiError::Validation(format!(
            "Amount must be a whole dollar value between ${} and ${}",
            min, max
        )));
    }
    let dollars = amount_dollars as i64;
    if dollars < min || dollars > max {
        return Err(ApiError::Validation(format!(
            "Amount must be between ${} and ${}",
            min, max
        )));
    }
    Ok(dollars * 100)
}

/// Looks up the member's processor customer, creating and persisting one on
/// first use. A concurrent first checkout can race this lookup-then-insert;
/// the loser leaves an orphaned processor customer behind, which is harmless.
async fn resolve_customer(state: &AppState, member: &Member) -> Result<String, ApiError> {
    if let Some(mapping) = state.billing.find_customer_by_member(member.id).await? {
        return Ok(mapping.stripe_customer_id);
    }
    let customer_id = state.stripe.create_customer(&member.email, member.id).await?;
    state
        .billing
        .insert_customer_mapping(member.id, &customer_id)
        .await?;
    info!(member_id = %member.id, customer_id, "created processor customer");
    Ok(customer_id)
}

/// Maps an amount in cents to a recurring price id, creating and caching
/// one the first time that amount is seen. The cache is append-only.
async fn resolve_price(state: &AppState, amount_cents: i64) -> Result<String, ApiError> {
    if let Some(price_id) = state.billing.find_price_id_by_amount(amount_cents).await? {
        return Ok(price_id);
    }
    let price_id = state.stripe.create_monthly_price(amount_cents).await?;
    state.billing.insert_price(amount_cents, &price_id).await?;
    info!(amount_cents, price_id, "created monthly price");
    Ok(price_id)
}

// POST /api/billing/create-checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    AuthMember(member): AuthMember,
    Json(req): Json<AmountRequest>,
) -> Result<Json<Value>, ApiError> {
    let amount_cents = amount_to_cents(&state, req.amount_dollars)?;

    // One subscription per member, enforced here rather than in the store.
    if let Some(sub) = state.billing.find_subscription_by_member(member.id).await? {
        if BLOCKING_STATUSES.contains(&sub.status.as_str()) {
            return Err(ApiError::Conflict(
                "You already have an active subscription. Use the billing portal to change it."
                    .into(),
            ));
        }
    }

    let customer = resolve_customer(&state, &member).await?;
    let price = resolve_price(&state, amount_cents).await?;

    let origin = &state.config.frontend_origin;
    let session = state
        .stripe
        .create_checkout_session(CreateCheckoutSessionRequest {
            customer,
            price,
            success_url: format!("{}/index.html?checkout=success", origin),
            cancel_url: format!("{}/contribution.html?checkout=canceled", origin),
            member_id: member.id,
        })
        .await?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Upstream("checkout session returned no url".into()))?;
    // No local subscription row yet; the webhook writes it once payment
    // settles.
    Ok(Json(json!({ "url": url })))
}

// POST /api/billing/create-billing-portal
pub async fn create_billing_portal(
    State(state): State<AppState>,
    AuthMember(member): AuthMember,
    Json(req): Json<PortalRequest>,
) -> Result<Json<Value>, ApiError> {
    let mapping = state
        .billing
        .find_customer_by_member(member.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No billing account exists for this member".into()))?;

    let flow = match req.flow_type.as_deref() {
        Some("payment_method_update") => PortalFlow::PaymentMethodUpdate,
        Some("subscription_cancel") => {
            // Without a current subscription the portal still opens, just
            // without a scoped cancel flow.
            match state.billing.find_subscription_by_member(member.id).await? {
                Some(sub) => PortalFlow::SubscriptionCancel {
                    subscription_id: sub.stripe_subscription_id,
                },
                None => PortalFlow::None,
            }
        }
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unknown portal flow: {}",
                other
            )))
        }
        None => PortalFlow::None,
    };

    let return_url = format!("{}/settings.html", state.config.frontend_origin);
    let url = state
        .stripe
        .create_portal_session(&mapping.stripe_customer_id, &return_url, flow)
        .await?;

    Ok(Json(json!({ "url": url })))
}

// POST /api/billing/update-subscription
pub async fn update_subscription(
    State(state): State<AppState>,
    AuthMember(member): AuthMember,
    Json(req): Json<AmountRequest>,
) -> Result<Json<Value>, ApiError> {
    let amount_cents = amount_to_cents(&state, req.amount_dollars)?;

    let sub = state
        .billing
        .find_subscription_by_member(member.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No subscription exists for this member".into()))?;

    let price = resolve_price(&state, amount_cents).await?;
    state
        .stripe
        .change_subscription_price(&sub.stripe_subscription_id, &price)
        .await?;

    info!(
        member_id = %member.id,
        amount_cents,
        "requested contribution change; local row updates on the next webhook"
    );
    // The local row is deliberately untouched; subscription.updated will
    // carry the new amount.
    Ok(Json(json!({})))
}
