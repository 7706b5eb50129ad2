//! Outbound HTTP clients for third-party providers.

pub mod email;
pub mod sms;
pub mod stripe;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is not configured")]
    NotConfigured { provider: &'static str },

    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} rejected the request ({status}): {body}")]
    Rejected {
        provider: &'static str,
        status: u16,
        body: String,
    },
}

impl ProviderError {
    fn http(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ProviderError::Http { provider, source }
    }
}

/// Reads the body of a non-2xx reply into a `Rejected` error.
async fn reject(provider: &'static str, res: reqwest::Response) -> ProviderError {
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default().chars().take(400).collect();
    ProviderError::Rejected { provider, status, body }
}
