use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    config::SendgridConfig,
    utils::format::{format_currency, strip_tags},
};

use super::{ProviderError, reject};

const PROVIDER: &str = "sendgrid";
const SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

const STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
.container { max-width: 600px; margin: 0 auto; padding: 20px; }
.header { background: #2563eb; color: white; padding: 20px; text-align: center; }
.content { padding: 20px; background: #f9fafb; }
.footer { text-align: center; padding: 20px; font-size: 12px; color: #666; }
.button { display: inline-block; padding: 12px 24px; background: #2563eb; color: white; text-decoration: none; border-radius: 6px; margin: 20px 0; }";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl EmailMessage {
    pub fn text(&self) -> String {
        strip_tags(&self.html)
    }
}

pub struct QuoteEmail<'a> {
    pub to: &'a str,
    pub customer_name: &'a str,
    pub quote_number: &'a str,
    pub total: i64,
    pub business_name: &'a str,
    pub quote_link: &'a str,
    pub valid_days: i64,
}

fn layout(heading: &str, body: &str, footer: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><style>{STYLE}</style></head><body>\
         <div class=\"container\">\
         <div class=\"header\"><h1>{heading}</h1></div>\
         <div class=\"content\">{body}</div>\
         <div class=\"footer\"><p>{footer}</p></div>\
         </div></body></html>"
    )
}

pub fn welcome_email(to: &str, name: &str, trial_days: i64) -> EmailMessage {
    let body = format!(
        "<p>Hi {name},</p>\
         <p>Thanks for signing up! Your {trial_days}-day free trial has started.</p>\
         <p>Here's what you can do with TradeFlow:</p>\
         <ul>\
         <li>Schedule and manage bookings with ease</li>\
         <li>Send automatic SMS and email reminders</li>\
         <li>Create professional quotes</li>\
         <li>Track customers and job history</li>\
         <li>Accept payments online</li>\
         </ul>\
         <p>Get started by creating your first booking!</p>"
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Welcome to TradeFlow - Your trial has started!".into(),
        html: layout("Welcome to TradeFlow!", &body, "Questions? Reply to this email - we're here to help!"),
    }
}

pub fn quote_email(quote: &QuoteEmail<'_>) -> EmailMessage {
    let body = format!(
        "<p>Hi {customer},</p>\
         <p>{business} has prepared a quote for you:</p>\
         <p><strong>Quote Number:</strong> {number}</p>\
         <p><strong>Total:</strong> {total} AUD (inc. GST)</p>\
         <p style=\"text-align: center;\"><a href=\"{link}\" class=\"button\">View Quote</a></p>\
         <p>This quote is valid for {days} days. If you have any questions, please don't hesitate to contact us.</p>",
        customer = quote.customer_name,
        business = quote.business_name,
        number = quote.quote_number,
        total = format_currency(quote.total),
        link = quote.quote_link,
        days = quote.valid_days,
    );
    EmailMessage {
        to: quote.to.to_string(),
        subject: format!("Quote {} from {}", quote.quote_number, quote.business_name),
        html: layout("Your Quote is Ready", &body, "Powered by TradeFlow - Smart Scheduling for Tradies"),
    }
}

#[derive(Clone)]
pub struct EmailClient {
    http: Client,
    config: Option<SendgridConfig>,
}

impl EmailClient {
    pub fn new(http: Client, config: Option<SendgridConfig>) -> Self {
        Self { http, config }
    }

    /// Sends through SendGrid. Returns `Ok(false)` when no API key is set.
    pub async fn send(&self, message: &EmailMessage) -> Result<bool, ProviderError> {
        let Some(config) = &self.config else {
            warn!(subject = %message.subject, "SendGrid not configured, email not sent");
            return Ok(false);
        };

        let payload = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": config.from_email, "name": config.from_name },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.text() },
                { "type": "text/html", "value": message.html },
            ],
        });

        let res = self
            .http
            .post(SEND_URL)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(ProviderError::http(PROVIDER))?;

        if !res.status().is_success() {
            return Err(reject(PROVIDER, res).await);
        }

        info!(subject = %message.subject, "email sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_email_shows_formatted_total() {
        let message = quote_email(&QuoteEmail {
            to: "jane@example.com",
            customer_name: "Jane",
            quote_number: "QT-2025-0003",
            total: 165_000,
            business_name: "Sparky Electrical",
            quote_link: "http://localhost:3000/quotes/abc",
            valid_days: 30,
        });
        assert_eq!(message.subject, "Quote QT-2025-0003 from Sparky Electrical");
        assert!(message.html.contains("$1,650.00 AUD"));
        assert!(message.text().contains("Hi Jane,"));
        assert!(!message.text().contains('<'));
    }

    #[test]
    fn welcome_email_mentions_trial_length() {
        let message = welcome_email("bob@example.com", "Bob's Plumbing", 14);
        assert!(message.html.contains("14-day free trial"));
    }

    #[tokio::test]
    async fn unconfigured_client_skips() {
        let client = EmailClient::new(Client::new(), None);
        let sent = client.send(&welcome_email("a@b.co", "A", 14)).await.unwrap();
        assert!(!sent);
    }
}
