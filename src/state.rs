use crate::config::Config;
use crate::db::{billing_repository::BillingRepository, member_repository::MemberRepository};
use crate::services::identity::IdentityService;
use crate::services::stripe::StripeService;
use reqwest::Client;
use std::sync::Arc;

/// Explicitly constructed, dependency-injected clients. No process-wide
/// singletons beyond the Config assembled once at startup.
#[derive(Clone)]
pub struct AppState {
    pub members: Arc<dyn MemberRepository>,
    pub billing: Arc<dyn BillingRepository>,
    pub identity: Arc<dyn IdentityService>,
    pub stripe: Arc<dyn StripeService>,
    pub http_client: Arc<Client>,
    pub config: Arc<Config>,
}
