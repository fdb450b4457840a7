use super::{IdentityError, IdentityService, IdentityUser};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

/// GoTrue-style identity provider client. Token verification hits the
/// user endpoint with the caller's bearer token; administration uses
/// the service key.
pub struct LiveIdentityService {
    client: Arc<Client>,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct ProviderUser {
    id: uuid::Uuid,
    email: String,
}

#[derive(Deserialize)]
struct UserListPage {
    users: Vec<ProviderUser>,
}

impl LiveIdentityService {
    pub fn new(client: Arc<Client>, base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            service_key: service_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityService for LiveIdentityService {
    async fn verify_token(&self, token: &str) -> Result<IdentityUser, IdentityError> {
        let resp = self
            .client
            .get(self.url("/auth/v1/user"))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IdentityError::InvalidToken(
                "token rejected by identity provider".into(),
            ));
        }
        if !resp.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "user lookup returned {}",
                resp.status()
            )));
        }

        let user: ProviderUser = resp
            .json()
            .await
            .map_err(|e| IdentityError::Serde(e.to_string()))?;
        Ok(IdentityUser {
            id: user.id,
            email: user.email,
        })
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<IdentityUser>, IdentityError> {
        let resp = self
            .client
            .get(self.url("/auth/v1/admin/users"))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .query(&[("email", email)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "admin user lookup returned {}",
                resp.status()
            )));
        }

        let page: UserListPage = resp
            .json()
            .await
            .map_err(|e| IdentityError::Serde(e.to_string()))?;

        // Some provider versions treat the email param as a prefix filter,
        // so match exactly on our side.
        Ok(page
            .users
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| IdentityUser {
                id: u.id,
                email: u.email,
            }))
    }

    async fn invite_user(
        &self,
        email: &str,
        invited_by: uuid::Uuid,
    ) -> Result<IdentityUser, IdentityError> {
        let invited_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| IdentityError::Serde(e.to_string()))?;
        let resp = self
            .client
            .post(self.url("/auth/v1/invite"))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&json!({
                "email": email,
                "data": {
                    "invited_by": invited_by,
                    "invited_at": invited_at,
                }
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, %body, "identity invite failed");
            return Err(IdentityError::Provider(format!(
                "invite returned {}",
                status
            )));
        }

        let user: ProviderUser = resp
            .json()
            .await
            .map_err(|e| IdentityError::Serde(e.to_string()))?;
        Ok(IdentityUser {
            id: user.id,
            email: user.email,
        })
    }

    async fn send_recovery_email(&self, email: &str) -> Result<(), IdentityError> {
        let resp = self
            .client
            .post(self.url("/auth/v1/recover"))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&json!({ "email": email }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "recovery email returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
