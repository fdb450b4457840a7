#![allow(dead_code)]
use super::{IdentityError, IdentityService, IdentityUser};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MockIdentityService {
    /// token -> user returned by verify_token.
    pub tokens: Arc<Mutex<HashMap<String, IdentityUser>>>,
    pub users: Arc<Mutex<Vec<IdentityUser>>>,
    /// (email, inviting admin id) per invite sent.
    pub invites: Arc<Mutex<Vec<(String, Uuid)>>>,
    pub recovery_emails: Arc<Mutex<Vec<String>>>,
    pub fail_invites: Arc<Mutex<bool>>,
}

impl MockIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_token(&self, token: &str, user: IdentityUser) {
        self.tokens.lock().unwrap().insert(token.to_string(), user);
    }

    pub fn seed_user(&self, user: IdentityUser) {
        self.users.lock().unwrap().push(user);
    }

    pub fn with_failing_invites(self) -> Self {
        *self.fail_invites.lock().unwrap() = true;
        self
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    async fn verify_token(&self, token: &str) -> Result<IdentityUser, IdentityError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::InvalidToken("unknown token".into()))
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<IdentityUser>, IdentityError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn invite_user(
        &self,
        email: &str,
        invited_by: Uuid,
    ) -> Result<IdentityUser, IdentityError> {
        if *self.fail_invites.lock().unwrap() {
            return Err(IdentityError::Provider("invite returned 500".into()));
        }
        self.invites
            .lock()
            .unwrap()
            .push((email.to_string(), invited_by));
        let user = IdentityUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn send_recovery_email(&self, email: &str) -> Result<(), IdentityError> {
        self.recovery_emails.lock().unwrap().push(email.to_string());
        Ok(())
    }
}
