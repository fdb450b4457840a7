use axum::http::header::AUTHORIZATION;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::errors::ApiError;
use crate::models::member::{Member, MemberRole};
use crate::state::AppState;

/// The authenticated member behind the current request. Extraction verifies
/// the bearer token with the identity provider, then loads the member's
/// directory row. A provider identity without a member row is rejected.
#[derive(Debug)]
pub struct AuthMember(pub Member);

impl FromRequestParts<AppState> for AuthMember {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated("Missing authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthenticated("Malformed authorization header".into()))?;

        let user = state.identity.verify_token(token).await?;

        let member = state
            .members
            .find_member_by_id(user.id)
            .await?
            .ok_or_else(|| ApiError::Unauthenticated("No member record for this account".into()))?;

        if !member.is_active {
            return Err(ApiError::Forbidden(
                "This account has been deactivated".into(),
            ));
        }

        // First authenticated request completes onboarding. Not worth failing
        // the request over.
        if !member.setup_completed {
            if let Err(err) = state.members.mark_setup_completed(member.id).await {
                warn!(?err, member_id = %member.id, "failed to mark setup completed");
            }
        }

        Ok(AuthMember(member))
    }
}

pub fn require_admin(member: &Member) -> Result<(), ApiError> {
    if member.role != MemberRole::Admin {
        return Err(ApiError::Forbidden("Administrator access required".into()));
    }
    Ok(())
}
