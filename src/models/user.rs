use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_tier", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    Starter,
    Professional,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl SubscriptionTier {
    fn rank(self) -> u8 {
        match self {
            SubscriptionTier::Starter => 1,
            SubscriptionTier::Professional => 2,
            SubscriptionTier::Premium => 3,
        }
    }

    /// True when this tier includes everything `required` does.
    pub fn has_feature_access(self, required: SubscriptionTier) -> bool {
        self.rank() >= required.rank()
    }

    /// List price in AUD cents.
    pub fn price(self, period: BillingPeriod) -> i64 {
        match (self, period) {
            (SubscriptionTier::Starter, BillingPeriod::Monthly) => 2_900,
            (SubscriptionTier::Starter, BillingPeriod::Yearly) => 29_000,
            (SubscriptionTier::Professional, BillingPeriod::Monthly) => 5_900,
            (SubscriptionTier::Professional, BillingPeriod::Yearly) => 59_000,
            (SubscriptionTier::Premium, BillingPeriod::Monthly) => 9_900,
            (SubscriptionTier::Premium, BillingPeriod::Yearly) => 99_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Cancelled,
}

#[derive(Serialize, Debug, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub business_name: Option<String>,
    pub trade_type: Option<String>,
    pub abn: Option<String>,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_ends_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_subscription_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub timezone: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignupReq {
    pub email: String,
    pub password: String,
    pub business_name: Option<String>,
    pub phone: Option<String>,
    pub trade_type: Option<String>,
    pub abn: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered() {
        use SubscriptionTier::*;
        assert!(Premium.has_feature_access(Professional));
        assert!(Professional.has_feature_access(Professional));
        assert!(!Starter.has_feature_access(Professional));
        assert!(!Professional.has_feature_access(Premium));
    }

    #[test]
    fn yearly_is_ten_months() {
        for tier in [SubscriptionTier::Starter, SubscriptionTier::Professional, SubscriptionTier::Premium] {
            assert_eq!(tier.price(BillingPeriod::Yearly), tier.price(BillingPeriod::Monthly) * 10);
        }
    }
}
