use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::invoice::Invoice;
use crate::models::member::{Member, MemberRole};
use crate::models::subscription::Subscription;
use crate::responses::MessageResponse;
use crate::routes::auth::{require_admin, AuthMember};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TargetMemberRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct InviteRequest {
    pub email: String,
    #[serde(default)]
    pub resend: bool,
}

// GET /api/admin/members
pub async fn list_members(
    State(state): State<AppState>,
    AuthMember(caller): AuthMember,
) -> Result<Json<Vec<Member>>, ApiError> {
    require_admin(&caller)?;
    Ok(Json(state.members.list_members().await?))
}

// GET /api/admin/subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
    AuthMember(caller): AuthMember,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    require_admin(&caller)?;
    Ok(Json(state.billing.list_subscriptions().await?))
}

// GET /api/admin/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    AuthMember(caller): AuthMember,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    require_admin(&caller)?;
    Ok(Json(state.billing.list_invoices().await?))
}

// POST /api/admin/deactivate-user
//
// Cancels the member's subscription at the processor first, but a
// cancellation failure does not block the local deactivation.
pub async fn deactivate_user(
    State(state): State<AppState>,
    AuthMember(caller): AuthMember,
    Json(req): Json<TargetMemberRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_admin(&caller)?;

    if req.user_id == caller.id {
        return Err(ApiError::Conflict(
            "You cannot deactivate your own account".into(),
        ));
    }

    let target = state
        .members
        .find_member_by_id(req.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No such member".into()))?;
    if target.role == MemberRole::Admin {
        return Err(ApiError::Conflict(
            "Administrator accounts cannot be deactivated".into(),
        ));
    }

    if let Some(sub) = state.billing.find_subscription_by_member(target.id).await? {
        match state
            .stripe
            .cancel_subscription_immediately(&sub.stripe_subscription_id)
            .await
        {
            Ok(()) => {
                info!(member_id = %target.id, "canceled subscription during deactivation")
            }
            Err(err) => {
                warn!(?err, member_id = %target.id, "subscription cancellation failed; deactivating anyway")
            }
        }
        state
            .billing
            .set_subscription_status(target.id, "canceled")
            .await?;
    }

    state.members.set_member_active(target.id, false).await?;
    info!(member_id = %target.id, admin_id = %caller.id, "member deactivated");
    Ok(Json(MessageResponse {
        message: "Member deactivated".into(),
    }))
}

// POST /api/admin/reactivate-user
//
// Flips the active flag only. The member starts a fresh checkout themselves
// if they want to contribute again.
pub async fn reactivate_user(
    State(state): State<AppState>,
    AuthMember(caller): AuthMember,
    Json(req): Json<TargetMemberRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_admin(&caller)?;

    let target = state
        .members
        .find_member_by_id(req.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No such member".into()))?;

    state.members.set_member_active(target.id, true).await?;
    info!(member_id = %target.id, admin_id = %caller.id, "member reactivated");
    Ok(Json(MessageResponse {
        message: "Member reactivated".into(),
    }))
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

// POST /api/admin/invite-user
pub async fn invite_user(
    State(state): State<AppState>,
    AuthMember(caller): AuthMember,
    Json(req): Json<InviteRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&caller)?;

    let email = req.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(ApiError::Validation("Invalid email address".into()));
    }

    if let Some(existing) = state.identity.find_user_by_email(&email).await? {
        if req.resend {
            // The user exists but never finished setup; a recovery email
            // lets them set a password without a second invite.
            state.identity.send_recovery_email(&email).await?;
            info!(%email, "re-sent setup email to existing identity");
            return Ok(Json(json!({
                "message": "Setup email re-sent",
                "user_id": existing.id,
            })));
        }
        return Err(ApiError::Conflict(
            "A user with this email already exists".into(),
        ));
    }

    let invited = state.identity.invite_user(&email, caller.id).await?;
    info!(%email, user_id = %invited.id, "invited new member");
    Ok(Json(json!({
        "message": "Invitation sent",
        "user_id": invited.id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::{MockBillingRepo, MockMemberRepo};
    use crate::routes::test_support::{make_member, test_state};
    use crate::services::identity::{IdentityUser, MockIdentityService};
    use crate::services::stripe::MockStripeService;
    use axum::extract::State as AxumState;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn active_sub(member_id: Uuid) -> Subscription {
        Subscription {
            member_id,
            stripe_subscription_id: "sub_1".into(),
            status: "active".into(),
            current_amount_cents: 4200,
            currency: "usd".into(),
            current_period_end: None,
            cancel_at_period_end: false,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn listing_requires_admin_role() {
        let member = make_member(MemberRole::Member);
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![member.clone()])),
            Arc::new(MockBillingRepo::new()),
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new()),
        );

        let err = list_members(AxumState(state), AuthMember(member))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deactivate_cancels_subscription_and_clears_active_flag() {
        let admin = make_member(MemberRole::Admin);
        let target = make_member(MemberRole::Member);
        let members = Arc::new(MockMemberRepo::with_members(vec![
            admin.clone(),
            target.clone(),
        ]));
        let billing = Arc::new(MockBillingRepo::new());
        billing.seed_subscription(active_sub(target.id));
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(
            members.clone(),
            billing.clone(),
            Arc::new(MockIdentityService::new()),
            stripe.clone(),
        );

        deactivate_user(
            AxumState(state),
            AuthMember(admin),
            Json(TargetMemberRequest { user_id: target.id }),
        )
        .await
        .unwrap();

        assert_eq!(
            stripe.cancellations.lock().unwrap().as_slice(),
            &["sub_1".to_string()]
        );
        assert_eq!(
            members.active_updates.lock().unwrap().as_slice(),
            &[(target.id, false)]
        );
        let subs = billing.subscriptions.lock().unwrap();
        assert_eq!(subs.get(&target.id).unwrap().status, "canceled");
    }

    #[tokio::test]
    async fn deactivate_survives_processor_cancellation_failure() {
        let admin = make_member(MemberRole::Admin);
        let target = make_member(MemberRole::Member);
        let members = Arc::new(MockMemberRepo::with_members(vec![
            admin.clone(),
            target.clone(),
        ]));
        let billing = Arc::new(MockBillingRepo::new());
        billing.seed_subscription(active_sub(target.id));
        let state = test_state(
            members.clone(),
            billing.clone(),
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new().with_failing_cancellation()),
        );

        deactivate_user(
            AxumState(state),
            AuthMember(admin),
            Json(TargetMemberRequest { user_id: target.id }),
        )
        .await
        .unwrap();

        assert_eq!(
            members.active_updates.lock().unwrap().as_slice(),
            &[(target.id, false)]
        );
        let subs = billing.subscriptions.lock().unwrap();
        assert_eq!(subs.get(&target.id).unwrap().status, "canceled");
    }

    #[tokio::test]
    async fn self_deactivation_is_rejected_without_mutation() {
        let admin = make_member(MemberRole::Admin);
        let members = Arc::new(MockMemberRepo::with_members(vec![admin.clone()]));
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(
            members.clone(),
            Arc::new(MockBillingRepo::new()),
            Arc::new(MockIdentityService::new()),
            stripe.clone(),
        );

        let err = deactivate_user(
            AxumState(state),
            AuthMember(admin.clone()),
            Json(TargetMemberRequest { user_id: admin.id }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(members.active_updates.lock().unwrap().is_empty());
        assert!(stripe.cancellations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_targets_cannot_be_deactivated() {
        let admin = make_member(MemberRole::Admin);
        let other_admin = make_member(MemberRole::Admin);
        let members = Arc::new(MockMemberRepo::with_members(vec![
            admin.clone(),
            other_admin.clone(),
        ]));
        let state = test_state(
            members.clone(),
            Arc::new(MockBillingRepo::new()),
            Arc::new(MockIdentityService::new()),
            Arc::new(MockStripeService::new()),
        );

        let err = deactivate_user(
            AxumState(state),
            AuthMember(admin),
            Json(TargetMemberRequest {
                user_id: other_admin.id,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(members.active_updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reactivate_only_flips_active_flag() {
        let admin = make_member(MemberRole::Admin);
        let mut target = make_member(MemberRole::Member);
        target.is_active = false;
        let members = Arc::new(MockMemberRepo::with_members(vec![
            admin.clone(),
            target.clone(),
        ]));
        let stripe = Arc::new(MockStripeService::new());
        let state = test_state(
            members.clone(),
            Arc::new(MockBillingRepo::new()),
            Arc::new(MockIdentityService::new()),
            stripe.clone(),
        );

        reactivate_user(
            AxumState(state),
            AuthMember(admin),
            Json(TargetMemberRequest { user_id: target.id }),
        )
        .await
        .unwrap();

        assert_eq!(
            members.active_updates.lock().unwrap().as_slice(),
            &[(target.id, true)]
        );
        // No processor interaction on reactivation
        assert!(stripe.checkout_requests.lock().unwrap().is_empty());
        assert!(stripe.cancellations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invite_creates_identity_for_new_email() {
        let admin = make_member(MemberRole::Admin);
        let admin_id = admin.id;
        let identity = Arc::new(MockIdentityService::new());
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![admin.clone()])),
            Arc::new(MockBillingRepo::new()),
            identity.clone(),
            Arc::new(MockStripeService::new()),
        );

        let resp = invite_user(
            AxumState(state),
            AuthMember(admin),
            Json(InviteRequest {
                email: "New.Member@Example.Test".into(),
                resend: false,
            }),
        )
        .await
        .unwrap();

        assert_eq!(resp.0["message"], "Invitation sent");
        // Normalized email plus the inviting admin's id are recorded
        assert_eq!(
            identity.invites.lock().unwrap().as_slice(),
            &[("new.member@example.test".to_string(), admin_id)]
        );
    }

    #[tokio::test]
    async fn invite_duplicate_email_conflicts_unless_resend() {
        let admin = make_member(MemberRole::Admin);
        let identity = Arc::new(MockIdentityService::new());
        identity.seed_user(IdentityUser {
            id: Uuid::new_v4(),
            email: "existing@example.test".into(),
        });
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![admin.clone()])),
            Arc::new(MockBillingRepo::new()),
            identity.clone(),
            Arc::new(MockStripeService::new()),
        );

        let err = invite_user(
            AxumState(state.clone()),
            AuthMember(admin.clone()),
            Json(InviteRequest {
                email: "existing@example.test".into(),
                resend: false,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let resp = invite_user(
            AxumState(state),
            AuthMember(admin),
            Json(InviteRequest {
                email: "existing@example.test".into(),
                resend: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.0["message"], "Setup email re-sent");
        assert_eq!(
            identity.recovery_emails.lock().unwrap().as_slice(),
            &["existing@example.test".to_string()]
        );
        assert!(identity.invites.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invite_rejects_malformed_email() {
        let admin = make_member(MemberRole::Admin);
        let identity = Arc::new(MockIdentityService::new());
        let state = test_state(
            Arc::new(MockMemberRepo::with_members(vec![admin.clone()])),
            Arc::new(MockBillingRepo::new()),
            identity.clone(),
            Arc::new(MockStripeService::new()),
        );

        for bad in ["not-an-email", "@nodomain.test", "user@nodot"] {
            let err = invite_user(
                AxumState(state.clone()),
                AuthMember(admin.clone()),
                Json(InviteRequest {
                    email: bad.into(),
                    resend: false,
                }),
            )
            .await
            .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(identity.invites.lock().unwrap().is_empty());
    }
}
