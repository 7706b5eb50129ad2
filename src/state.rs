use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::{
    config::Config,
    integrations::{email::EmailClient, sms::SmsClient, stripe::StripeClient},
    utils::ratelimit::RateLimiter,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,
    pub email: EmailClient,
    pub sms: SmsClient,
    pub stripe: StripeClient,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            pool,
            rate_limiter: Arc::new(RateLimiter::new()),
            email: EmailClient::new(http.clone(), config.sendgrid.clone()),
            sms: SmsClient::new(http.clone(), config.twilio.clone()),
            stripe: StripeClient::new(http, config.stripe.clone()),
            config: Arc::new(config),
        })
    }
}
