use axum::Json;
use serde_json::{json, Value};

use crate::{
    models::user::{BillingPeriod, SubscriptionTier},
    utils::jwt::AuthUser,
};

const TIERS: [SubscriptionTier; 3] = [
    SubscriptionTier::Starter,
    SubscriptionTier::Professional,
    SubscriptionTier::Premium,
];

fn plans_for(current: SubscriptionTier) -> Vec<Value> {
    TIERS
        .iter()
        .map(|&tier| {
            json!({
                "tier": tier,
                "monthlyPrice": tier.price(BillingPeriod::Monthly),
                "yearlyPrice": tier.price(BillingPeriod::Yearly),
                "current": tier == current,
                "included": current.has_feature_access(tier)
            })
        })
        .collect()
}

pub async fn get_plans(auth: AuthUser) -> Json<Value> {
    let current = auth.0.subscription_tier;
    Json(json!({
        "success": true,
        "data": {
            "currentTier": current,
            "plans": plans_for(current)
        }
    }))
}
