use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Http(err.to_string())
    }
}

/// A user as the identity provider knows them. The id doubles as the
/// member id in the local directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    pub email: String,
}

/// Token verification and user administration against the external
/// identity provider. The provider owns credentials and sessions; this
/// service never sees passwords.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolves a bearer token to the user it belongs to.
    async fn verify_token(&self, token: &str) -> Result<IdentityUser, IdentityError>;

    async fn find_user_by_email(&self, email: &str)
        -> Result<Option<IdentityUser>, IdentityError>;

    /// Sends an invite email and creates the provider-side user. The
    /// inviting admin's id is recorded in the new user's metadata.
    async fn invite_user(
        &self,
        email: &str,
        invited_by: Uuid,
    ) -> Result<IdentityUser, IdentityError>;

    /// Sends a recovery (set-password) email to an existing user.
    async fn send_recovery_email(&self, email: &str) -> Result<(), IdentityError>;
}

mod live;
mod mock;

#[allow(unused_imports)]
pub use live::LiveIdentityService;
#[allow(unused_imports)]
pub use mock::MockIdentityService;
