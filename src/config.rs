use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is missing in env")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("JWT_SECRET must be at least 32 characters outside development")]
    WeakJwtSecret,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SendgridConfig {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const DEFAULT: RateLimitConfig = RateLimitConfig {
        max_requests: 100,
        window: Duration::from_secs(60),
    };

    pub const AUTH: RateLimitConfig = RateLimitConfig {
        max_requests: 5,
        window: Duration::from_secs(15 * 60),
    };
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_address: String,
    pub app_url: String,
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub trial_days: i64,
    pub default_tax_rate: Decimal,
    pub quote_validity_days: i64,
    pub api_rate_limit: RateLimitConfig,
    pub auth_rate_limit: RateLimitConfig,
    pub stripe: Option<StripeConfig>,
    pub sendgrid: Option<SendgridConfig>,
    pub twilio: Option<TwilioConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let environment = get("APP_ENV").unwrap_or_else(|| "development".into());
        if environment != "development" && jwt_secret.len() < 32 {
            return Err(ConfigError::WeakJwtSecret);
        }

        let stripe = get("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
        });

        let sendgrid = get("SENDGRID_API_KEY").map(|api_key| SendgridConfig {
            api_key,
            from_email: get("SENDGRID_FROM_EMAIL").unwrap_or_else(|| "hello@tradeflow.com.au".into()),
            from_name: get("SENDGRID_FROM_NAME").unwrap_or_else(|| "TradeFlow".into()),
        });

        let twilio = match (get("TWILIO_ACCOUNT_SID"), get("TWILIO_AUTH_TOKEN")) {
            (Some(account_sid), Some(auth_token)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number: get("TWILIO_PHONE_NUMBER").unwrap_or_else(|| "+61412345678".into()),
            }),
            _ => None,
        };

        let api_rate_limit = RateLimitConfig {
            max_requests: parse_or(&get, "RATE_LIMIT_API_MAX", RateLimitConfig::DEFAULT.max_requests)?,
            window: Duration::from_secs(parse_or(
                &get,
                "RATE_LIMIT_API_WINDOW_SECS",
                RateLimitConfig::DEFAULT.window.as_secs(),
            )?),
        };

        let auth_rate_limit = RateLimitConfig {
            max_requests: parse_or(&get, "RATE_LIMIT_AUTH_MAX", RateLimitConfig::AUTH.max_requests)?,
            window: Duration::from_secs(parse_or(
                &get,
                "RATE_LIMIT_AUTH_WINDOW_SECS",
                RateLimitConfig::AUTH.window.as_secs(),
            )?),
        };

        let default_tax_rate: Decimal = parse_or(&get, "DEFAULT_TAX_RATE", Decimal::from(10))?;
        if default_tax_rate < Decimal::ZERO || default_tax_rate > Decimal::ONE_HUNDRED {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_TAX_RATE",
                value: default_tax_rate.to_string(),
            });
        }

        Ok(Config {
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 15)?,
            server_address: get("SERVER_ADDRESS").unwrap_or_else(|| "127.0.0.1:7870".into()),
            app_url: get("APP_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            jwt_secret,
            token_expiry_hours: parse_or(&get, "TOKEN_EXPIRY_HOURS", 24)?,
            trial_days: parse_or(&get, "TRIAL_DAYS", 14)?,
            default_tax_rate,
            quote_validity_days: parse_or(&get, "QUOTE_VALIDITY_DAYS", 30)?,
            api_rate_limit,
            auth_rate_limit,
            stripe,
            sendgrid,
            twilio,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/tradeflow"),
            ("JWT_SECRET", "dev"),
        ]))
        .unwrap();
        assert_eq!(config.server_address, "127.0.0.1:7870");
        assert_eq!(config.token_expiry_hours, 24);
        assert_eq!(config.trial_days, 14);
        assert_eq!(config.default_tax_rate, Decimal::from(10));
        assert_eq!(config.auth_rate_limit.max_requests, 5);
        assert!(config.stripe.is_none());
        assert!(config.sendgrid.is_none());
        assert!(config.twilio.is_none());
    }

    #[test]
    fn api_rate_limit_is_configurable() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/tradeflow"),
            ("JWT_SECRET", "dev"),
            ("RATE_LIMIT_API_MAX", "3"),
            ("RATE_LIMIT_API_WINDOW_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.api_rate_limit.max_requests, 3);
        assert_eq!(config.api_rate_limit.window, Duration::from_secs(10));

        let defaults = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/tradeflow"),
            ("JWT_SECRET", "dev"),
        ]))
        .unwrap();
        assert_eq!(defaults.api_rate_limit.max_requests, 100);
        assert_eq!(defaults.api_rate_limit.window, Duration::from_secs(60));
    }

    #[test]
    fn missing_database_url_fails() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "dev")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn short_secret_rejected_in_production() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tradeflow"),
            ("JWT_SECRET", "short"),
            ("APP_ENV", "production"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::WeakJwtSecret));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tradeflow"),
            ("JWT_SECRET", "dev"),
            ("TRIAL_DAYS", "two weeks"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TRIAL_DAYS", .. }));
    }

    #[test]
    fn twilio_needs_both_credentials() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tradeflow"),
            ("JWT_SECRET", "dev"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
        ]))
        .unwrap();
        assert!(config.twilio.is_none());
    }
}
