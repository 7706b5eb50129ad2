use axum::{Json, body::Bytes, extract::{Path, Query, State}, http::StatusCode};
use serde_json::{json, Value};
use sqlx::{PgConnection, Postgres, QueryBuilder, types::Json as JsonColumn};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    engine::compute_totals,
    integrations::{email::{QuoteEmail, quote_email}, sms::quote_notification},
    models::{
        booking::Booking,
        customer::Customer,
        payment::Payment,
        quote::{CreateQuoteReq, Quote, QuoteQueryParams, QuoteStatus, QuoteWithCustomer, SendQuoteReq, UpdateQuoteReq},
    },
    state::AppState,
    utils::{
        errorhandler::AppError, format::generate_quote_number, jwt::AuthUser, pagination::Pagination,
        sql::PartialUpdate, validate,
    },
};

const DEFAULT_LIMIT: i64 = 20;

fn push_quote_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid, params: &QuoteQueryParams) {
    qb.push(" WHERE q.user_id = ");
    qb.push_bind(user_id);
    if let Some(status) = params.status {
        qb.push(" AND q.status = ");
        qb.push_bind(status);
    }
    if let Some(customer_id) = params.customer_id {
        qb.push(" AND q.customer_id = ");
        qb.push_bind(customer_id);
    }
}

/// Next `QT-<year>-<seq>` for this owner. Caller holds the owner's row lock.
async fn next_quote_number(conn: &mut PgConnection, user_id: Uuid, year: i32) -> Result<String, AppError> {
    let prefix = format!("QT-{year}-");
    let last: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(split_part(quote_number, '-', 3)::BIGINT), 0)
        FROM quotes
        WHERE user_id = $1 AND quote_number LIKE $2
        "#,
    )
    .bind(user_id)
    .bind(format!("{prefix}%"))
    .fetch_one(&mut *conn)
    .await?;

    Ok(generate_quote_number(year, last + 1))
}

pub async fn get_quotes(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<QuoteQueryParams>,
) -> Result<Json<Value>, AppError> {
    let page = Pagination::new(params.page, params.limit, DEFAULT_LIMIT);

    let mut qb = QueryBuilder::new(
        r#"SELECT q.*, c.name AS customer_name, c.email AS customer_email, c.phone AS customer_phone
        FROM quotes q JOIN customers c ON c.id = q.customer_id"#,
    );
    push_quote_filters(&mut qb, auth.id(), &params);
    qb.push(" ORDER BY q.created_at DESC LIMIT ");
    qb.push_bind(page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());

    let quotes = qb
        .build_query_as::<QuoteWithCustomer>()
        .fetch_all(&state.pool)
        .await?;

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM quotes q");
    push_quote_filters(&mut count, auth.id(), &params);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "quotes": quotes },
        "meta": page.meta(total)
    })))
}

pub async fn create_quote(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateQuoteReq>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate::min_len("title", &payload.title, 3, "Title is required")?;
    let discount = payload.discount_amount.unwrap_or(0);
    let tax_rate = state.config.default_tax_rate;
    let totals = compute_totals(&payload.line_items, discount, tax_rate, payload.deposit_percentage)?;

    let mut tx = state.pool.begin().await?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1 AND user_id = $2")
        .bind(payload.customer_id)
        .bind(auth.id())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::bad_request("Customer not found or does not belong to you"))?;

    if let Some(booking_id) = payload.booking_id {
        let owned: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookings WHERE id = $1 AND user_id = $2)")
            .bind(booking_id)
            .bind(auth.id())
            .fetch_one(&mut *tx)
            .await?;
        if !owned {
            return Err(AppError::bad_request("Booking not found or does not belong to you"));
        }
    }

    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(auth.id())
        .execute(&mut *tx)
        .await?;

    let now = OffsetDateTime::now_utc();
    let quote_number = next_quote_number(&mut tx, auth.id(), now.year()).await?;
    let valid_until = payload
        .valid_until
        .unwrap_or(now + Duration::days(state.config.quote_validity_days));

    let quote = sqlx::query_as::<_, Quote>(
        r#"
        INSERT INTO quotes (id, user_id, customer_id, booking_id, quote_number, title, description, line_items,
                            subtotal, tax_rate, tax_amount, discount_amount, total, status, valid_until, terms,
                            notes, deposit_percentage, deposit_amount)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.id())
    .bind(customer.id)
    .bind(payload.booking_id)
    .bind(&quote_number)
    .bind(payload.title.trim())
    .bind(payload.description)
    .bind(JsonColumn(payload.line_items))
    .bind(totals.subtotal)
    .bind(tax_rate)
    .bind(totals.tax_amount)
    .bind(discount)
    .bind(totals.total)
    .bind(QuoteStatus::Draft)
    .bind(valid_until)
    .bind(payload.terms)
    .bind(payload.notes)
    .bind(payload.deposit_percentage)
    .bind(totals.deposit_amount)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(quote_id = %quote.id, quote_number = %quote.quote_number, total = quote.total, "quote created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "quote": quote,
                "customer": {
                    "id": customer.id,
                    "name": customer.name,
                    "email": customer.email,
                    "phone": customer.phone
                }
            }
        })),
    ))
}

pub async fn get_quote_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let quote = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Quote not found"))?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quote.customer_id)
        .fetch_one(&state.pool)
        .await?;

    let booking = match quote.booking_id {
        Some(booking_id) => sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&state.pool)
            .await?,
        None => None,
    };

    let payments = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE quote_id = $1 ORDER BY created_at DESC")
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    let mut data = serde_json::to_value(&quote).map_err(|_| AppError::Unexpected)?;
    data["customer"] = json!(customer);
    data["booking"] = json!(booking);
    data["payments"] = json!(payments);

    Ok(Json(json!({
        "success": true,
        "data": { "quote": data }
    })))
}

pub async fn update_quote(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuoteReq>,
) -> Result<Json<Value>, AppError> {
    if let Some(title) = &payload.title {
        validate::min_len("title", title, 3, "Title is required")?;
    }

    let mut tx = state.pool.begin().await?;

    let existing = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1 AND user_id = $2 FOR UPDATE")
        .bind(id)
        .bind(auth.id())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Quote not found"))?;

    let mut update = PartialUpdate::new("quotes");

    if payload.changes_totals() {
        let line_items = payload.line_items.clone().unwrap_or_else(|| existing.line_items.0.clone());
        let discount = payload.discount_amount.unwrap_or(existing.discount_amount);
        let deposit_percentage = payload.deposit_percentage.or(existing.deposit_percentage);
        let totals = compute_totals(&line_items, discount, existing.tax_rate, deposit_percentage)?;

        update
            .set("line_items", payload.line_items.clone().map(JsonColumn))
            .assign("discount_amount", discount)
            .assign("deposit_percentage", deposit_percentage)
            .assign("subtotal", totals.subtotal)
            .assign("tax_amount", totals.tax_amount)
            .assign("total", totals.total)
            .assign("deposit_amount", totals.deposit_amount);
    }

    update
        .set("title", payload.title.map(|t| t.trim().to_string()))
        .set("description", payload.description)
        .set("valid_until", payload.valid_until)
        .set("terms", payload.terms)
        .set("notes", payload.notes);

    if update.is_empty() {
        return Err(AppError::bad_request("no parameters provided"));
    }
    update.set_expr("updated_at", "now()");

    let quote = update
        .finish(id, auth.id())
        .build_query_as::<Quote>()
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(json!({
        "success": true,
        "data": { "quote": quote }
    })))
}

pub async fn delete_quote(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM quotes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Quote not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_quote(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    // an empty body means "both channels"
    let options: SendQuoteReq = if body.iter().all(u8::is_ascii_whitespace) {
        SendQuoteReq::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::bad_request(format!("Invalid request body: {e}")))?
    };

    let quote = sqlx::query_as::<_, Quote>("SELECT * FROM quotes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Quote not found"))?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quote.customer_id)
        .fetch_one(&state.pool)
        .await?;

    let business_name: Option<String> = sqlx::query_scalar("SELECT business_name FROM users WHERE id = $1")
        .bind(auth.id())
        .fetch_one(&state.pool)
        .await?;
    let business_name = business_name.unwrap_or_else(|| "Your Tradie".to_string());
    let quote_link = format!("{}/quotes/{}/view", state.config.app_url.trim_end_matches('/'), quote.id);

    let mut email_sent = false;
    let mut sms_sent = false;

    if options.send_email {
        if let Some(to) = customer.email.as_deref().filter(|e| !e.is_empty()) {
            let message = quote_email(&QuoteEmail {
                to,
                customer_name: &customer.name,
                quote_number: &quote.quote_number,
                total: quote.total,
                business_name: &business_name,
                quote_link: &quote_link,
                valid_days: state.config.quote_validity_days,
            });
            match state.email.send(&message).await {
                Ok(sent) => email_sent = sent,
                Err(e) => warn!("Failed to send quote email for {}: {}", quote.quote_number, e),
            }
        }
    }

    if options.send_sms && !customer.phone.trim().is_empty() {
        let text = quote_notification(&customer.name, &business_name, &quote.quote_number, &quote_link);
        match state.sms.send(&customer.phone, &text).await {
            Ok(sid) => sms_sent = sid.is_some(),
            Err(e) => warn!("Failed to send quote SMS for {}: {}", quote.quote_number, e),
        }
    }

    let quote = sqlx::query_as::<_, Quote>(
        "UPDATE quotes SET status = $1, sent_at = now(), updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(QuoteStatus::Sent)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    info!(quote_id = %id, email_sent, sms_sent, "quote sent");

    Ok(Json(json!({
        "success": true,
        "data": {
            "quote": quote,
            "emailSent": email_sent,
            "smsSent": sms_sent,
            "message": "Quote sent successfully"
        }
    })))
}
