use axum::{Json, extract::{Path, Query, State}, http::StatusCode};
use serde_json::{json, Value};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use time::{Date, Duration, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    engine::{check_no_conflict, BookingSlot, Interval},
    models::{
        booking::{
            Booking, BookingQueryParams, BookingStatus, BookingTimeRow, BookingWithCustomer, CreateBookingReq,
            Priority, Reminder, ReminderStatus, ReminderType, UpdateBookingReq,
        },
        customer::Customer,
        payment::Payment,
        quote::Quote,
    },
    state::AppState,
    utils::{errorhandler::AppError, jwt::AuthUser, pagination::Pagination, sql::PartialUpdate, validate},
};

const DEFAULT_LIMIT: i64 = 50;
const REMINDER_LEAD: Duration = Duration::hours(24);

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_filter_time(field: &str, raw: &str) -> Result<OffsetDateTime, AppError> {
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(at);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| AppError::invalid_field(field, "Expected an RFC 3339 timestamp or YYYY-MM-DD date"))
}

fn push_booking_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    user_id: Uuid,
    params: &BookingQueryParams,
    from: Option<OffsetDateTime>,
    to: Option<OffsetDateTime>,
) {
    qb.push(" WHERE b.user_id = ");
    qb.push_bind(user_id);
    if let Some(status) = params.status {
        qb.push(" AND b.status = ");
        qb.push_bind(status);
    }
    if let Some(customer_id) = params.customer_id {
        qb.push(" AND b.customer_id = ");
        qb.push_bind(customer_id);
    }
    if let Some(from) = from {
        qb.push(" AND b.scheduled_start >= ");
        qb.push_bind(from);
    }
    if let Some(to) = to {
        qb.push(" AND b.scheduled_start <= ");
        qb.push_bind(to);
    }
}

/// A live booking must (re)claim its slot when its times move or when it comes back from
/// cancellation.
fn needs_slot_check(previous: BookingStatus, next: BookingStatus, times_changed: bool) -> bool {
    next != BookingStatus::Cancelled && (times_changed || previous == BookingStatus::Cancelled)
}

/// Serialises bookings per owner for the rest of the transaction, then runs the conflict
/// checker over the owner's overlapping live bookings.
async fn ensure_slot_free(
    conn: &mut PgConnection,
    user_id: Uuid,
    candidate: &Interval,
    exclude_id: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let rows = sqlx::query_as::<_, BookingTimeRow>(
        r#"
        SELECT id, scheduled_start, scheduled_end, status
        FROM bookings
        WHERE user_id = $1
          AND status <> 'CANCELLED'
          AND scheduled_start < $3
          AND scheduled_end > $2
        "#,
    )
    .bind(user_id)
    .bind(candidate.start())
    .bind(candidate.end())
    .fetch_all(&mut *conn)
    .await?;

    let existing = rows
        .into_iter()
        .map(|r| BookingSlot::new(r.id, r.scheduled_start, r.scheduled_end, r.status))
        .collect::<Result<Vec<_>, _>>()?;

    check_no_conflict(&existing, candidate, exclude_id).map_err(|e| {
        warn!("Booking conflict for user {}: {}", user_id, e);
        AppError::from(e)
    })
}

/// Queues the 24h reminder when that moment is still ahead of us.
async fn schedule_reminder(
    conn: &mut PgConnection,
    booking: &Booking,
    customer_email: Option<&str>,
    customer_phone: &str,
) -> Result<(), AppError> {
    let due = booking.scheduled_start - REMINDER_LEAD;
    if due <= OffsetDateTime::now_utc() {
        return Ok(());
    }
    let has_email = customer_email.is_some_and(|e| !e.is_empty());
    let Some(kind) = ReminderType::for_contact(has_email, !customer_phone.trim().is_empty()) else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO reminders (id, booking_id, reminder_type, scheduled_for, status) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(booking.id)
    .bind(kind)
    .bind(due)
    .bind(ReminderStatus::Scheduled)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn cancel_reminders(conn: &mut PgConnection, booking_id: Uuid) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE reminders SET status = 'CANCELLED' WHERE booking_id = $1 AND status = 'SCHEDULED'",
    )
    .bind(booking_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn owned_customer(conn: &mut PgConnection, user_id: Uuid, customer_id: Uuid) -> Result<Customer, AppError> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1 AND user_id = $2")
        .bind(customer_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::bad_request("Customer not found or does not belong to you"))
}

pub async fn get_bookings(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<BookingQueryParams>,
) -> Result<Json<Value>, AppError> {
    let page = Pagination::new(params.page, params.limit, DEFAULT_LIMIT);
    let from = params.start_date.as_deref().map(|s| parse_filter_time("startDate", s)).transpose()?;
    let to = params.end_date.as_deref().map(|s| parse_filter_time("endDate", s)).transpose()?;

    let mut qb = QueryBuilder::new(
        r#"SELECT b.*, c.name AS customer_name, c.email AS customer_email, c.phone AS customer_phone
        FROM bookings b JOIN customers c ON c.id = b.customer_id"#,
    );
    push_booking_filters(&mut qb, auth.id(), &params, from, to);
    qb.push(" ORDER BY b.scheduled_start ASC LIMIT ");
    qb.push_bind(page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());

    let bookings = qb
        .build_query_as::<BookingWithCustomer>()
        .fetch_all(&state.pool)
        .await?;

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM bookings b");
    push_booking_filters(&mut count, auth.id(), &params, from, to);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "bookings": bookings },
        "meta": page.meta(total)
    })))
}

pub async fn create_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateBookingReq>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate::min_len("title", &payload.title, 3, "Title is required")?;
    validate::positive_cents("estimatedCost", payload.estimated_cost)?;
    let interval = Interval::new(payload.scheduled_start, payload.scheduled_end)?;

    let mut tx = state.pool.begin().await?;

    let customer = owned_customer(&mut tx, auth.id(), payload.customer_id).await?;
    ensure_slot_free(&mut tx, auth.id(), &interval, None).await?;

    // address fields fall back to the customer's
    let booking = sqlx::query_as::<_, Booking>(
        r#"
        INSERT INTO bookings (id, user_id, customer_id, title, description, job_type, scheduled_start,
                              scheduled_end, all_day, address, suburb, city, state, postcode, estimated_cost,
                              materials_needed, internal_notes, customer_notes, priority, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.id())
    .bind(customer.id)
    .bind(payload.title.trim())
    .bind(payload.description)
    .bind(payload.job_type)
    .bind(interval.start())
    .bind(interval.end())
    .bind(payload.all_day.unwrap_or(false))
    .bind(payload.address.or(customer.address.clone()))
    .bind(payload.suburb.or(customer.suburb.clone()))
    .bind(payload.city.or(customer.city.clone()))
    .bind(payload.state.or(customer.state.clone()))
    .bind(payload.postcode.or(customer.postcode.clone()))
    .bind(payload.estimated_cost)
    .bind(payload.materials_needed)
    .bind(payload.internal_notes)
    .bind(payload.customer_notes)
    .bind(payload.priority.unwrap_or(Priority::Normal))
    .bind(BookingStatus::Scheduled)
    .fetch_one(&mut *tx)
    .await?;

    schedule_reminder(&mut tx, &booking, customer.email.as_deref(), &customer.phone).await?;

    tx.commit().await?;
    info!(booking_id = %booking.id, user_id = %auth.id(), "booking created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "booking": booking,
                "customer": {
                    "id": customer.id,
                    "name": customer.name,
                    "email": customer.email,
                    "phone": customer.phone,
                    "address": customer.address
                }
            }
        })),
    ))
}

pub async fn get_booking_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(booking.customer_id)
        .fetch_one(&state.pool)
        .await?;

    let quotes = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE booking_id = $1 ORDER BY created_at DESC")
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    let payments = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at DESC")
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    let reminders = sqlx::query_as::<_, Reminder>(
        "SELECT id, booking_id, reminder_type, scheduled_for, status, sent_at FROM reminders WHERE booking_id = $1 ORDER BY scheduled_for",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let mut data = serde_json::to_value(&booking).map_err(|_| AppError::Unexpected)?;
    data["customer"] = json!(customer);
    data["quotes"] = json!(quotes);
    data["payments"] = json!(payments);
    data["reminders"] = json!(reminders);

    Ok(Json(json!({
        "success": true,
        "data": { "booking": data }
    })))
}

pub async fn update_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookingReq>,
) -> Result<Json<Value>, AppError> {
    if let Some(title) = &payload.title {
        validate::min_len("title", title, 3, "Title is required")?;
    }
    validate::positive_cents("estimatedCost", payload.estimated_cost)?;
    validate::positive_cents("actualCost", payload.actual_cost)?;
    validate::positive_cents("depositAmount", payload.deposit_amount)?;

    let mut tx = state.pool.begin().await?;

    let existing = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE")
        .bind(id)
        .bind(auth.id())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;

    let customer = match payload.customer_id {
        Some(customer_id) if customer_id != existing.customer_id => {
            Some(owned_customer(&mut tx, auth.id(), customer_id).await?)
        }
        _ => None,
    };

    let next_status = payload.status.unwrap_or(existing.status);
    let times_changed = payload.scheduled_start.is_some() || payload.scheduled_end.is_some();
    let reclaims_slot = needs_slot_check(existing.status, next_status, times_changed);
    if times_changed || reclaims_slot {
        let interval = Interval::new(
            payload.scheduled_start.unwrap_or(existing.scheduled_start),
            payload.scheduled_end.unwrap_or(existing.scheduled_end),
        )?;
        if reclaims_slot {
            ensure_slot_free(&mut tx, auth.id(), &interval, Some(id)).await?;
        }
    }

    let mut update = PartialUpdate::new("bookings");
    update
        .set("customer_id", customer.as_ref().map(|c| c.id))
        .set("title", payload.title.map(|t| t.trim().to_string()))
        .set("description", payload.description)
        .set("job_type", payload.job_type)
        .set("scheduled_start", payload.scheduled_start)
        .set("scheduled_end", payload.scheduled_end)
        .set("all_day", payload.all_day)
        .set("address", payload.address)
        .set("suburb", payload.suburb)
        .set("city", payload.city)
        .set("state", payload.state)
        .set("postcode", payload.postcode)
        .set("estimated_cost", payload.estimated_cost)
        .set("actual_cost", payload.actual_cost)
        .set("materials_needed", payload.materials_needed)
        .set("internal_notes", payload.internal_notes)
        .set("customer_notes", payload.customer_notes)
        .set("priority", payload.priority)
        .set("deposit_amount", payload.deposit_amount)
        .set("deposit_paid", payload.deposit_paid);

    if let Some(status) = payload.status {
        update.assign("status", status);
        match status {
            BookingStatus::Completed => {
                update.set_expr("completed_at", "now()").set_expr("actual_end", "now()");
            }
            BookingStatus::Cancelled => {
                update
                    .set_expr("cancelled_at", "now()")
                    .assign("cancellation_reason", payload.cancellation_reason);
            }
            BookingStatus::InProgress => {
                update.set_expr("actual_start", "now()");
            }
            _ => {}
        }
    }

    if update.is_empty() {
        return Err(AppError::bad_request("no parameters provided"));
    }
    update.set_expr("updated_at", "now()");

    let booking = update
        .finish(id, auth.id())
        .build_query_as::<Booking>()
        .fetch_one(&mut *tx)
        .await?;

    if booking.status == BookingStatus::Cancelled {
        cancel_reminders(&mut tx, id).await?;
    } else if reclaims_slot {
        cancel_reminders(&mut tx, id).await?;
        let contact = match customer {
            Some(c) => c,
            None => owned_customer(&mut tx, auth.id(), booking.customer_id).await?,
        };
        schedule_reminder(&mut tx, &booking, contact.email.as_deref(), &contact.phone).await?;
    }

    tx.commit().await?;
    info!(booking_id = %id, status = ?booking.status, "booking updated");

    Ok(Json(json!({
        "success": true,
        "data": { "booking": booking }
    })))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut tx = state.pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE bookings SET status = 'CANCELLED', cancelled_at = now(), updated_at = now()
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(auth.id())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Booking not found"));
    }

    let reminders = cancel_reminders(&mut tx, id).await?;
    tx.commit().await?;

    info!(booking_id = %id, reminders, "booking cancelled");
    Ok(StatusCode::NO_CONTENT)
}
