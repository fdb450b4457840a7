mod config;
mod db;
mod errors;
mod models;
mod responses;
mod routes;
mod services;
mod state;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use config::Config;
use db::postgres_billing_repository::PostgresBillingRepository;
use db::postgres_member_repository::PostgresMemberRepository;
use db::{billing_repository::BillingRepository, member_repository::MemberRepository};
use reqwest::Client;
use responses::JsonResponse;
use routes::admin::{
    deactivate_user, invite_user, list_invoices, list_members, list_subscriptions,
    reactivate_user,
};
use routes::billing::{create_billing_portal, create_checkout, update_subscription};
use services::identity::{IdentityService, LiveIdentityService};
use services::stripe::{LiveStripeService, StripeService};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Cleanup of stale per-IP limiter entries
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let config = Arc::new(Config::from_env());

    let pg_pool = establish_connection(&config.database_url).await;
    let members = Arc::new(PostgresMemberRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn MemberRepository>;
    let billing = Arc::new(PostgresBillingRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn BillingRepository>;

    let http_client = Arc::new(Client::new());
    let identity = Arc::new(LiveIdentityService::new(
        http_client.clone(),
        config.identity.base_url.clone(),
        config.identity.service_key.clone(),
    )) as Arc<dyn IdentityService>;
    let stripe = Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;

    let state = AppState {
        members,
        billing,
        identity,
        stripe,
        http_client,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let billing_routes = Router::new()
        .route("/create-checkout", post(create_checkout))
        .route("/create-billing-portal", post(create_billing_portal))
        .route("/update-subscription", post(update_subscription));

    let admin_routes = Router::new()
        .route("/members", get(list_members))
        .route("/subscriptions", get(list_subscriptions))
        .route("/invoices", get(list_invoices))
        .route("/deactivate-user", post(deactivate_user))
        .route("/reactivate-user", post(reactivate_user))
        .route("/invite-user", post(invite_user));

    // The webhook route carries no user credential; its signature check is
    // the only gate.
    let app = Router::new()
        .route("/", get(root))
        .nest("/api/billing", billing_routes)
        .route("/api/stripe/webhook", post(routes::stripe::webhook))
        .nest("/api/admin", admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    let listener = TcpListener::bind(addr).await.unwrap();
    info!("listening on http://{}", addr);
    axum::serve(listener, make_service).await.unwrap();
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Membership portal backend").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> PgPool {
    let pool = PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("connected to the database");
    pool
}
