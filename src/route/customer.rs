use axum::{Json, extract::{Path, Query, State}, http::StatusCode};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::customer::{
        BookingSummary, CreateCustomerReq, Customer, CustomerListItem, CustomerQueryParams, QuoteSummary,
        UpdateCustomerReq, PREFERRED_CONTACTS,
    },
    state::AppState,
    utils::{errorhandler::AppError, jwt::AuthUser, pagination::Pagination, sql::PartialUpdate, validate},
};

const DEFAULT_LIMIT: i64 = 20;

/// `%term%` with LIKE wildcards in the term matched literally.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_customer_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid, search: Option<&str>) {
    qb.push(" WHERE c.user_id = ");
    qb.push_bind(user_id);

    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        qb.push(" AND (c.name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(r" ESCAPE '\' OR c.email ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(r" ESCAPE '\' OR c.phone LIKE ");
        qb.push_bind(pattern);
        qb.push(r" ESCAPE '\')");
    }
}

fn check_preferred_contact(value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(v) if !PREFERRED_CONTACTS.contains(&v) => Err(AppError::invalid_field(
            "preferredContact",
            "Preferred contact must be one of phone, email, sms",
        )),
        _ => Ok(()),
    }
}

pub async fn get_customers(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<CustomerQueryParams>,
) -> Result<Json<Value>, AppError> {
    let page = Pagination::new(params.page, params.limit, DEFAULT_LIMIT);

    let mut qb = QueryBuilder::new(
        r#"SELECT c.*,
            (SELECT COUNT(*) FROM bookings b WHERE b.customer_id = c.id) AS booking_count,
            (SELECT COUNT(*) FROM quotes q WHERE q.customer_id = c.id) AS quote_count
        FROM customers c"#,
    );
    push_customer_filters(&mut qb, auth.id(), params.search.as_deref());
    qb.push(" ORDER BY c.created_at DESC LIMIT ");
    qb.push_bind(page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());

    let customers = qb
        .build_query_as::<CustomerListItem>()
        .fetch_all(&state.pool)
        .await?;

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM customers c");
    push_customer_filters(&mut count, auth.id(), params.search.as_deref());
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    Ok(Json(json!({
        "success": true,
        "data": customers,
        "meta": page.meta(total)
    })))
}

pub async fn create_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateCustomerReq>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate::min_len("name", &payload.name, 2, "Name is required")?;
    validate::min_len("phone", &payload.phone, 10, "Phone number is required")?;
    let email = validate::optional_email("email", payload.email)?;
    check_preferred_contact(payload.preferred_contact.as_deref())?;

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (id, user_id, name, email, phone, address, suburb, city, state, postcode,
                               notes, property_type, preferred_contact, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.id())
    .bind(payload.name.trim())
    .bind(email)
    .bind(payload.phone.trim())
    .bind(payload.address)
    .bind(payload.suburb)
    .bind(payload.city)
    .bind(payload.state)
    .bind(payload.postcode)
    .bind(payload.notes)
    .bind(payload.property_type)
    .bind(payload.preferred_contact)
    .bind(payload.tags.unwrap_or_default())
    .fetch_one(&state.pool)
    .await?;

    info!(customer_id = %customer.id, "customer created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": { "customer": customer }
        })),
    ))
}

pub async fn get_customer_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found"))?;

    let bookings = sqlx::query_as::<_, BookingSummary>(
        r#"
        SELECT id, title, scheduled_start, scheduled_end, status, estimated_cost, actual_cost
        FROM bookings WHERE customer_id = $1
        ORDER BY scheduled_start DESC LIMIT 10
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let quotes = sqlx::query_as::<_, QuoteSummary>(
        r#"
        SELECT id, quote_number, title, total, status, created_at
        FROM quotes WHERE customer_id = $1
        ORDER BY created_at DESC LIMIT 5
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let mut data = serde_json::to_value(&customer).map_err(|_| AppError::Unexpected)?;
    data["bookings"] = json!(bookings);
    data["quotes"] = json!(quotes);

    Ok(Json(json!({
        "success": true,
        "data": { "customer": data }
    })))
}

pub async fn update_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerReq>,
) -> Result<Json<Value>, AppError> {
    if let Some(name) = &payload.name {
        validate::min_len("name", name, 2, "Name is required")?;
    }
    if let Some(phone) = &payload.phone {
        validate::min_len("phone", phone, 10, "Phone number is required")?;
    }
    check_preferred_contact(payload.preferred_contact.as_deref())?;

    let mut update = PartialUpdate::new("customers");
    // "" clears the email
    if let Some(email) = payload.email {
        let email = validate::optional_email("email", Some(email))?;
        update.assign("email", email);
    }
    update
        .set("name", payload.name.map(|n| n.trim().to_string()))
        .set("phone", payload.phone.map(|p| p.trim().to_string()))
        .set("address", payload.address)
        .set("suburb", payload.suburb)
        .set("city", payload.city)
        .set("state", payload.state)
        .set("postcode", payload.postcode)
        .set("notes", payload.notes)
        .set("property_type", payload.property_type)
        .set("preferred_contact", payload.preferred_contact)
        .set("tags", payload.tags)
        .set_expr("last_contacted_at", "now()")
        .set_expr("updated_at", "now()");

    let customer = update
        .finish(id, auth.id())
        .build_query_as::<Customer>()
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| {
            warn!("Customer not found for update: {} by user: {}", id, auth.id());
            AppError::not_found("Customer not found")
        })?;

    Ok(Json(json!({
        "success": true,
        "data": { "customer": customer }
    })))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM customers WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.id())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Customer not found"));
    }

    info!(customer_id = %id, "customer deleted");
    Ok(StatusCode::NO_CONTENT)
}
