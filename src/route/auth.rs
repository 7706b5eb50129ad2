use axum::{Json, extract::State, http::{HeaderMap, StatusCode}};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    integrations::email::welcome_email,
    models::user::{LoginReq, SignupReq, SubscriptionStatus, SubscriptionTier, User},
    state::AppState,
    utils::{
        errorhandler::AppError,
        format::validate_abn,
        jwt::{AuthUser, issue_token},
        password::{hash_password, verify_password},
        ratelimit::client_ip,
        validate,
    },
};

fn token_for(config: &Config, user: &User) -> Result<String, AppError> {
    issue_token(&config.jwt_secret, config.token_expiry_hours, user)
}

pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignupReq>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state
        .rate_limiter
        .enforce(&format!("signup:{}", client_ip(&headers)), &state.config.auth_rate_limit)?;

    let email = payload.email.trim().to_lowercase();
    validate::email("email", &email)?;
    if payload.password.chars().count() < 8 {
        return Err(AppError::invalid_field("password", "Password must be at least 8 characters"));
    }
    if let Some(name) = &payload.business_name {
        validate::min_len("businessName", name, 2, "Business name is required")?;
    }
    let abn = match payload.abn.as_deref().map(|a| a.split_whitespace().collect::<String>()) {
        Some(abn) if abn.is_empty() => None,
        Some(abn) => {
            if abn.len() != 11 || !validate_abn(&abn) {
                return Err(AppError::invalid_field("abn", "Invalid ABN"));
            }
            Some(abn)
        }
        None => None,
    };

    let email_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.pool)
        .await?;
    if email_taken {
        return Err(AppError::conflict("Email already registered"));
    }

    if let Some(abn) = &abn {
        let abn_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE abn = $1)")
            .bind(abn)
            .fetch_one(&state.pool)
            .await?;
        if abn_taken {
            return Err(AppError::conflict("ABN already registered"));
        }
    }

    let password_hash = hash_password(payload.password).await?;
    let trial_ends_at = OffsetDateTime::now_utc() + Duration::days(state.config.trial_days);

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, business_name, phone, trade_type, abn,
                           subscription_tier, subscription_status, trial_ends_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&password_hash)
    .bind(&payload.business_name)
    .bind(&payload.phone)
    .bind(&payload.trade_type)
    .bind(&abn)
    .bind(SubscriptionTier::Starter)
    .bind(SubscriptionStatus::Trial)
    .bind(trial_ends_at)
    .fetch_one(&state.pool)
    .await?;

    let token = token_for(&state.config, &user)?;
    info!(user_id = %user.id, "account created");

    let message = welcome_email(
        &user.email,
        user.business_name.as_deref().unwrap_or("there"),
        state.config.trial_days,
    );
    let mailer = state.email.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&message).await {
            warn!("failed to send welcome email: {}", e);
        }
    });

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": { "user": user, "token": token }
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginReq>,
) -> Result<Json<Value>, AppError> {
    state
        .rate_limiter
        .enforce(&format!("login:{}", client_ip(&headers)), &state.config.auth_rate_limit)?;

    let email = payload.email.trim().to_lowercase();
    validate::email("email", &email)?;
    if payload.password.is_empty() {
        return Err(AppError::invalid_field("password", "Password is required"));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let Some(user) = user else {
        warn!("Failed login attempt: no account for {}", email);
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    if !verify_password(payload.password, user.password_hash.clone()).await? {
        warn!("Failed login attempt: invalid password for {}", email);
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET last_login_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .fetch_one(&state.pool)
    .await?;

    let token = token_for(&state.config, &user)?;

    Ok(Json(json!({
        "success": true,
        "data": { "user": user, "token": token }
    })))
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Value>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth.id())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(json!({
        "success": true,
        "data": { "user": user }
    })))
}

// Tokens are stateless; the client discards its copy.
pub async fn logout() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": { "message": "Logged out successfully" }
    }))
}
