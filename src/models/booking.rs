use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_priority", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Serialize, Deserialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub job_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_end: OffsetDateTime,
    pub all_day: bool,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub estimated_cost: Option<i64>,
    pub actual_cost: Option<i64>,
    pub materials_needed: Option<String>,
    pub internal_notes: Option<String>,
    pub customer_notes: Option<String>,
    pub priority: Priority,
    pub status: BookingStatus,
    pub deposit_amount: Option<i64>,
    pub deposit_paid: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub actual_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub actual_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Booking joined with the customer's contact summary for list views.
#[derive(Serialize, Debug, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithCustomer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub booking: Booking,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
}

/// The columns the conflict checker needs.
#[derive(Debug, FromRow)]
pub struct BookingTimeRow {
    pub id: Uuid,
    pub scheduled_start: OffsetDateTime,
    pub scheduled_end: OffsetDateTime,
    pub status: BookingStatus,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingReq {
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub job_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_end: OffsetDateTime,
    pub all_day: Option<bool>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub estimated_cost: Option<i64>,
    pub materials_needed: Option<String>,
    pub internal_notes: Option<String>,
    pub customer_notes: Option<String>,
    pub priority: Option<Priority>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingReq {
    pub customer_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub job_type: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_end: Option<OffsetDateTime>,
    pub all_day: Option<bool>,
    pub status: Option<BookingStatus>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub estimated_cost: Option<i64>,
    pub actual_cost: Option<i64>,
    pub materials_needed: Option<String>,
    pub internal_notes: Option<String>,
    pub customer_notes: Option<String>,
    pub priority: Option<Priority>,
    pub deposit_amount: Option<i64>,
    pub deposit_paid: Option<bool>,
    pub cancellation_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BookingQueryParams {
    pub status: Option<BookingStatus>,
    pub customer_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reminder_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderType {
    Email,
    Sms,
    Both,
}

impl ReminderType {
    /// Channel for a customer given which contact details they have.
    pub fn for_contact(has_email: bool, has_phone: bool) -> Option<Self> {
        match (has_email, has_phone) {
            (true, true) => Some(ReminderType::Both),
            (true, false) => Some(ReminderType::Email),
            (false, true) => Some(ReminderType::Sms),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reminder_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Scheduled,
    Sent,
    Failed,
    Cancelled,
}

#[derive(Serialize, Debug, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub reminder_type: ReminderType,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_for: OffsetDateTime,
    pub status: ReminderStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sent_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_channel_follows_contact_details() {
        assert_eq!(ReminderType::for_contact(true, true), Some(ReminderType::Both));
        assert_eq!(ReminderType::for_contact(true, false), Some(ReminderType::Email));
        assert_eq!(ReminderType::for_contact(false, true), Some(ReminderType::Sms));
        assert_eq!(ReminderType::for_contact(false, false), None);
    }

    #[test]
    fn statuses_use_upper_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&BookingStatus::NoShow).unwrap(), "\"NO_SHOW\"");
        let parsed: BookingStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(parsed, BookingStatus::InProgress);
    }

    #[test]
    fn create_request_parses_rfc3339_times() {
        let body = r#"{
            "customerId": "7f1d4c1e-8e0a-4a8e-9d7e-2d8a6d1f0b11",
            "title": "Hot water service",
            "scheduledStart": "2025-03-10T09:00:00+11:00",
            "scheduledEnd": "2025-03-10T11:30:00+11:00",
            "priority": "HIGH"
        }"#;
        let req: CreateBookingReq = serde_json::from_str(body).unwrap();
        assert_eq!(req.priority, Some(Priority::High));
        assert_eq!(
            req.scheduled_end - req.scheduled_start,
            time::Duration::minutes(150)
        );
    }
}
