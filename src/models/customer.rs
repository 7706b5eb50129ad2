use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{booking::BookingStatus, quote::QuoteStatus};

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub notes: Option<String>,
    pub property_type: Option<String>,
    pub preferred_contact: Option<String>,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_contacted_at: Option<OffsetDateTime>,
}

#[derive(Serialize, Debug, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub customer: Customer,
    pub booking_count: i64,
    pub quote_count: i64,
}

/// Job history row shown on the customer detail view.
#[derive(Serialize, Debug, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_end: OffsetDateTime,
    pub status: BookingStatus,
    pub estimated_cost: Option<i64>,
    pub actual_cost: Option<i64>,
}

#[derive(Serialize, Debug, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    pub id: Uuid,
    pub quote_number: String,
    pub title: String,
    pub total: i64,
    pub status: QuoteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerReq {
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub notes: Option<String>,
    pub property_type: Option<String>,
    pub preferred_contact: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerReq {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub notes: Option<String>,
    pub property_type: Option<String>,
    pub preferred_contact: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub const PREFERRED_CONTACTS: [&str; 3] = ["phone", "email", "sms"];

#[derive(Deserialize, Debug, Default)]
pub struct CustomerQueryParams {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
