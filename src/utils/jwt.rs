use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer}};
use chrono::{Duration, Utc};
use serde::{Deserialize,Serialize};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::warn;
use uuid::Uuid;

use crate::{models::user::{SubscriptionStatus, SubscriptionTier, User}, state::AppState, utils::errorhandler::AppError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub iat: usize,
    pub exp: usize,
}

pub fn issue_token(secret: &str, expiry_hours: i64, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        subscription_tier: user.subscription_tier,
        subscription_status: user.subscription_status,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(expiry_hours)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    ).map_err(|e| {
        warn!("JWT encoding failed: {}", e);
        AppError::Unexpected
    })
}

pub fn verify_auth_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("rejected bearer token: {}", e);
        AppError::unauthorized("Invalid or expired token")
    })?;

    Ok(token_data.claims)
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.sub
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(auth) = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::unauthorized("Authentication required"))?;

        let claims = verify_auth_token(&state.config.jwt_secret, auth.token())?;
        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            email: "sparky@example.com".into(),
            password_hash: String::new(),
            phone: None,
            business_name: Some("Sparky Electrical".into()),
            trade_type: Some("electrician".into()),
            abn: None,
            subscription_tier: SubscriptionTier::Starter,
            subscription_status: SubscriptionStatus::Trial,
            trial_ends_at: None,
            subscription_ends_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            address: None,
            city: None,
            state: None,
            postcode: None,
            timezone: "Australia/Sydney".into(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn issued_token_verifies() {
        let user = user();
        let token = issue_token("test-secret", 1, &user).unwrap();
        let claims = verify_auth_token("test-secret", &token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.subscription_status, SubscriptionStatus::Trial);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = issue_token("test-secret", 1, &user()).unwrap();
        let err = verify_auth_token("other-secret", &token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let token = issue_token("test-secret", -2, &user()).unwrap();
        assert!(verify_auth_token("test-secret", &token).is_err());
    }
}
