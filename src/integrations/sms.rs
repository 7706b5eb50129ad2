use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{config::TwilioConfig, utils::format::format_australian_phone};

use super::{ProviderError, reject};

const PROVIDER: &str = "twilio";

#[derive(Deserialize)]
struct MessageCreated {
    sid: String,
}

pub fn quote_notification(customer_name: &str, business_name: &str, quote_number: &str, quote_link: &str) -> String {
    format!(
        "Hi {customer_name}, {business_name} has sent you a quote ({quote_number}). View it here: {quote_link}"
    )
}

#[derive(Clone)]
pub struct SmsClient {
    http: Client,
    config: Option<TwilioConfig>,
}

impl SmsClient {
    pub fn new(http: Client, config: Option<TwilioConfig>) -> Self {
        Self { http, config }
    }

    /// Returns the Twilio message sid, or `None` when SMS is not configured.
    pub async fn send(&self, to: &str, body: &str) -> Result<Option<String>, ProviderError> {
        let Some(config) = &self.config else {
            warn!("Twilio not configured, SMS not sent");
            return Ok(None);
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            config.account_sid
        );
        let to = format_australian_phone(to);
        let form = [("To", to.as_str()), ("From", config.from_number.as_str()), ("Body", body)];

        let res = self
            .http
            .post(url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(ProviderError::http(PROVIDER))?;

        if !res.status().is_success() {
            return Err(reject(PROVIDER, res).await);
        }

        let created: MessageCreated = res.json().await.map_err(ProviderError::http(PROVIDER))?;
        info!(sid = %created.sid, "sms sent");
        Ok(Some(created.sid))
    }
}
