use std::env;

pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    /// The single recurring product every monthly price hangs off.
    pub product_id: String,
}

pub struct IdentitySettings {
    pub base_url: String,
    pub service_key: String,
}

pub struct ContributionSettings {
    /// Inclusive whole-dollar bounds for the monthly contribution.
    pub min_dollars: i64,
    pub max_dollars: i64,
}

pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub stripe: StripeSettings,
    pub identity: IdentitySettings,
    pub contribution: ContributionSettings,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");

        let stripe = StripeSettings {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            product_id: env::var("STRIPE_PRODUCT_ID").expect("STRIPE_PRODUCT_ID must be set"),
        };

        let identity = IdentitySettings {
            base_url: env::var("IDENTITY_BASE_URL").expect("IDENTITY_BASE_URL must be set"),
            service_key: env::var("IDENTITY_SERVICE_KEY")
                .expect("IDENTITY_SERVICE_KEY must be set"),
        };

        let contribution = ContributionSettings {
            min_dollars: env::var("CONTRIBUTION_MIN_DOLLARS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
            max_dollars: env::var("CONTRIBUTION_MAX_DOLLARS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(250),
        };

        Config {
            database_url,
            frontend_origin,
            stripe,
            identity,
            contribution,
        }
    }
}
