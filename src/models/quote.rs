use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One billable row. Money in cents; `total` must equal `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: i64,
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "quote_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Viewed,
    Accepted,
    Rejected,
    Expired,
    Converted,
}

#[derive(Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub quote_number: String,
    pub title: String,
    pub description: Option<String>,
    pub line_items: Json<Vec<LineItem>>,
    pub subtotal: i64,
    pub tax_rate: Decimal,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total: i64,
    pub status: QuoteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
    pub terms: Option<String>,
    pub notes: Option<String>,
    pub deposit_percentage: Option<Decimal>,
    pub deposit_amount: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sent_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub accepted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Serialize, Debug, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuoteWithCustomer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub quote: Quote,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteReq {
    pub customer_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub line_items: Vec<LineItem>,
    pub discount_amount: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub terms: Option<String>,
    pub notes: Option<String>,
    pub deposit_percentage: Option<Decimal>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteReq {
    pub title: Option<String>,
    pub description: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub discount_amount: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub terms: Option<String>,
    pub notes: Option<String>,
    pub deposit_percentage: Option<Decimal>,
}

impl UpdateQuoteReq {
    pub fn changes_totals(&self) -> bool {
        self.line_items.is_some() || self.discount_amount.is_some() || self.deposit_percentage.is_some()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendQuoteReq {
    #[serde(default = "default_true")]
    pub send_email: bool,
    #[serde(default = "default_true", alias = "sendSMS")]
    pub send_sms: bool,
}

impl Default for SendQuoteReq {
    fn default() -> Self {
        Self {
            send_email: true,
            send_sms: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQueryParams {
    pub status: Option<QuoteStatus>,
    pub customer_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_item_accepts_numeric_quantity() {
        let item: LineItem = serde_json::from_str(
            r#"{"description":"Copper pipe","quantity":2.5,"unitPrice":1200,"total":3000}"#,
        )
        .unwrap();
        assert_eq!(item.quantity, Decimal::new(25, 1));
        assert_eq!(item.notes, None);
    }

    #[test]
    fn send_options_default_to_both_channels() {
        let req: SendQuoteReq = serde_json::from_str("{}").unwrap();
        assert!(req.send_email && req.send_sms);
        let req: SendQuoteReq = serde_json::from_str(r#"{"sendSMS": false}"#).unwrap();
        assert!(req.send_email && !req.send_sms);
    }

    #[test]
    fn only_pricing_fields_trigger_recompute() {
        let req = UpdateQuoteReq { title: Some("New title".into()), ..Default::default() };
        assert!(!req.changes_totals());
        let req = UpdateQuoteReq { deposit_percentage: Some(Decimal::from(25)), ..Default::default() };
        assert!(req.changes_totals());
    }
}
