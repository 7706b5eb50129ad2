use axum::{Json, body::Bytes, extract::{Query, State}, http::{HeaderMap, StatusCode}};
use serde_json::{json, Value};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    integrations::stripe::{
        Event, InvoiceObject, NewPaymentIntent, PaymentIntentObject, SubscriptionObject, verify_webhook,
    },
    models::{
        payment::{CreatePaymentIntentReq, Payment, PaymentQueryParams, PaymentStatus, PaymentType},
        quote::QuoteStatus,
        user::SubscriptionStatus,
    },
    state::AppState,
    utils::{errorhandler::AppError, jwt::AuthUser, pagination::Pagination},
};

const DEFAULT_LIMIT: i64 = 20;

fn push_payment_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid, params: &PaymentQueryParams) {
    qb.push(" WHERE user_id = ");
    qb.push_bind(user_id);
    if let Some(status) = params.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
}

/// Stripe subscription state as we track it.
pub fn subscription_status_for(stripe_status: &str) -> SubscriptionStatus {
    match stripe_status {
        "active" | "trialing" => SubscriptionStatus::Active,
        _ => SubscriptionStatus::PastDue,
    }
}

pub async fn get_payments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<PaymentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let page = Pagination::new(params.page, params.limit, DEFAULT_LIMIT);

    let mut qb = QueryBuilder::new("SELECT * FROM payments");
    push_payment_filters(&mut qb, auth.id(), &params);
    qb.push(" ORDER BY created_at DESC LIMIT ");
    qb.push_bind(page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(page.offset());

    let payments = qb.build_query_as::<Payment>().fetch_all(&state.pool).await?;

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM payments");
    push_payment_filters(&mut count, auth.id(), &params);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "payments": payments },
        "meta": page.meta(total)
    })))
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreatePaymentIntentReq>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if payload.amount <= 0 {
        return Err(AppError::invalid_field("amount", "Amount must be positive"));
    }

    if let Some(booking_id) = payload.booking_id {
        let owned: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookings WHERE id = $1 AND user_id = $2)")
            .bind(booking_id)
            .bind(auth.id())
            .fetch_one(&state.pool)
            .await?;
        if !owned {
            return Err(AppError::not_found("Booking not found"));
        }
    }
    if let Some(quote_id) = payload.quote_id {
        let owned: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quotes WHERE id = $1 AND user_id = $2)")
            .bind(quote_id)
            .bind(auth.id())
            .fetch_one(&state.pool)
            .await?;
        if !owned {
            return Err(AppError::not_found("Quote not found"));
        }
    }

    let mut metadata = vec![
        ("userId", auth.id().to_string()),
        ("paymentType", payload.payment_type.as_str().to_string()),
    ];
    if let Some(booking_id) = payload.booking_id {
        metadata.push(("bookingId", booking_id.to_string()));
    }
    if let Some(quote_id) = payload.quote_id {
        metadata.push(("quoteId", quote_id.to_string()));
    }

    let intent = state
        .stripe
        .create_payment_intent(NewPaymentIntent {
            amount: payload.amount,
            description: payload.description.as_deref(),
            metadata,
        })
        .await
        .map_err(|e| {
            error!("Stripe payment intent failed: {}", e);
            AppError::upstream("Failed to create payment intent")
        })?;

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (id, user_id, booking_id, quote_id, stripe_payment_intent_id, amount, currency,
                              status, payment_type, description)
        VALUES ($1, $2, $3, $4, $5, $6, 'aud', $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.id())
    .bind(payload.booking_id)
    .bind(payload.quote_id)
    .bind(&intent.id)
    .bind(payload.amount)
    .bind(PaymentStatus::Pending)
    .bind(payload.payment_type)
    .bind(&payload.description)
    .fetch_one(&state.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "clientSecret": intent.client_secret,
                "paymentIntentId": intent.id,
                "payment": payment
            }
        })),
    ))
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("Missing stripe signature"))?;

    let Some(secret) = state.stripe.webhook_secret() else {
        error!("STRIPE_WEBHOOK_SECRET is not set, rejecting webhook");
        return Err(AppError::Unexpected);
    };

    let event = verify_webhook(&body, signature, secret, OffsetDateTime::now_utc().unix_timestamp())
        .map_err(|e| {
            warn!("Webhook signature verification failed: {}", e);
            AppError::bad_request("Invalid signature")
        })?;

    let mut tx = state.pool.begin().await?;
    handle_event(&mut tx, &event).await?;
    tx.commit().await?;

    Ok(Json(json!({
        "success": true,
        "data": { "received": true }
    })))
}

fn object<T: serde::de::DeserializeOwned>(event: &Event) -> Result<T, AppError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        warn!("Unreadable {} payload in event {}: {}", event.kind, event.id, e);
        AppError::bad_request("Malformed event object")
    })
}

async fn handle_event(conn: &mut PgConnection, event: &Event) -> Result<(), AppError> {
    match event.kind.as_str() {
        "payment_intent.succeeded" => {
            let intent: PaymentIntentObject = object(event)?;
            let payment = sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments SET status = $1, paid_at = now(), stripe_charge_id = $2
                WHERE stripe_payment_intent_id = $3
                RETURNING *
                "#,
            )
            .bind(PaymentStatus::Succeeded)
            .bind(&intent.latest_charge)
            .bind(&intent.id)
            .fetch_optional(&mut *conn)
            .await?;

            let Some(payment) = payment else {
                warn!("No payment recorded for intent {}", intent.id);
                return Ok(());
            };

            if let (Some(booking_id), PaymentType::Deposit) = (payment.booking_id, payment.payment_type) {
                sqlx::query("UPDATE bookings SET deposit_paid = TRUE, updated_at = now() WHERE id = $1")
                    .bind(booking_id)
                    .execute(&mut *conn)
                    .await?;
            }
            if let Some(quote_id) = payment.quote_id {
                sqlx::query("UPDATE quotes SET status = $1, accepted_at = now(), updated_at = now() WHERE id = $2")
                    .bind(QuoteStatus::Accepted)
                    .bind(quote_id)
                    .execute(&mut *conn)
                    .await?;
            }
            info!(payment_id = %payment.id, "payment succeeded");
        }
        "payment_intent.payment_failed" => {
            let intent: PaymentIntentObject = object(event)?;
            let reason = intent.last_payment_error.and_then(|e| e.message);
            sqlx::query("UPDATE payments SET status = $1, failure_reason = $2 WHERE stripe_payment_intent_id = $3")
                .bind(PaymentStatus::Failed)
                .bind(reason)
                .bind(&intent.id)
                .execute(&mut *conn)
                .await?;
            info!(payment_intent = %intent.id, "payment failed");
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let subscription: SubscriptionObject = object(event)?;
            let ends_at = subscription
                .current_period_end
                .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok());
            sqlx::query(
                r#"
                UPDATE users SET stripe_subscription_id = $1, subscription_status = $2,
                                 subscription_ends_at = COALESCE($3, subscription_ends_at), updated_at = now()
                WHERE stripe_customer_id = $4
                "#,
            )
            .bind(&subscription.id)
            .bind(subscription_status_for(&subscription.status))
            .bind(ends_at)
            .bind(&subscription.customer)
            .execute(&mut *conn)
            .await?;
        }
        "customer.subscription.deleted" => {
            let subscription: SubscriptionObject = object(event)?;
            let ended_at = subscription
                .ended_at
                .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok());
            sqlx::query(
                r#"
                UPDATE users SET subscription_status = $1,
                                 subscription_ends_at = COALESCE($2, now()), updated_at = now()
                WHERE stripe_customer_id = $3
                "#,
            )
            .bind(SubscriptionStatus::Cancelled)
            .bind(ended_at)
            .bind(&subscription.customer)
            .execute(&mut *conn)
            .await?;
        }
        "invoice.payment_succeeded" | "invoice.payment_failed" => {
            let invoice: InvoiceObject = object(event)?;
            let status = if event.kind == "invoice.payment_succeeded" {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::PastDue
            };
            let Some(customer) = invoice.customer else {
                warn!("Invoice {} has no customer", invoice.id);
                return Ok(());
            };
            sqlx::query("UPDATE users SET subscription_status = $1, updated_at = now() WHERE stripe_customer_id = $2")
                .bind(status)
                .bind(customer)
                .execute(&mut *conn)
                .await?;
        }
        other => info!("Unhandled Stripe event type: {}", other),
    }
    Ok(())
}
