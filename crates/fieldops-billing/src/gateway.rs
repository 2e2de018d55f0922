//! External billing gateway client.
//!
//! The provider is the system of record for billing truth: what the
//! subscription costs, whether it is still being paid for, and the date
//! up to which the tenant has already paid. The engine reaches it through
//! this narrow interface only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::BillingError;

/// Subscription detail as reported by the billing provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionDetail {
    /// The next instant the provider would bill. After a cancellation this
    /// is the date up to which the tenant has already paid, and it is
    /// authoritative for the grace period.
    #[serde(default)]
    pub next_billing_at: Option<DateTime<Utc>>,

    /// Whether the provider considers the subscription cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

/// Narrow interface to the external billing provider.
#[async_trait]
pub trait SubscriptionGateway: Send + Sync {
    /// Fetch the provider's current view of a subscription.
    async fn get_detail(
        &self,
        external_subscription_id: &str,
    ) -> Result<SubscriptionDetail, BillingError>;

    /// Instruct the provider to cancel a subscription.
    async fn cancel(
        &self,
        external_subscription_id: &str,
        reason: &str,
    ) -> Result<(), BillingError>;
}

#[derive(Serialize)]
struct CancelRequest<'a> {
    reason: &'a str,
}

/// HTTP client for the billing provider's REST API.
pub struct HttpSubscriptionGateway {
    config: GatewayConfig,
    client: Client,
}

impl std::fmt::Debug for HttpSubscriptionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSubscriptionGateway")
            .field("config", &self.config)
            .finish()
    }
}

impl HttpSubscriptionGateway {
    /// Create a gateway client from a validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, BillingError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                BillingError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    fn subscription_url(&self, external_subscription_id: &str) -> String {
        format!(
            "{}/subscriptions/{external_subscription_id}",
            self.config.base_url
        )
    }

    /// Map a non-success response to the error taxonomy: 4xx is a
    /// business-level rejection, anything else means the provider is not
    /// usable right now.
    async fn rejection_from(response: reqwest::Response) -> BillingError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            BillingError::GatewayRejected(format!("{status}: {body}"))
        } else {
            BillingError::GatewayUnavailable(format!("{status}: {body}"))
        }
    }
}

#[async_trait]
impl SubscriptionGateway for HttpSubscriptionGateway {
    async fn get_detail(
        &self,
        external_subscription_id: &str,
    ) -> Result<SubscriptionDetail, BillingError> {
        let response = self
            .client
            .get(self.subscription_url(external_subscription_id))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| BillingError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection_from(response).await);
        }

        response
            .json::<SubscriptionDetail>()
            .await
            .map_err(|e| BillingError::GatewayUnavailable(format!("Malformed response: {e}")))
    }

    async fn cancel(
        &self,
        external_subscription_id: &str,
        reason: &str,
    ) -> Result<(), BillingError> {
        tracing::debug!(
            external_subscription_id = %external_subscription_id,
            "Requesting subscription cancellation at billing provider"
        );

        let response = self
            .client
            .post(format!(
                "{}/cancel",
                self.subscription_url(external_subscription_id)
            ))
            .bearer_auth(&self.config.api_key)
            .json(&CancelRequest { reason })
            .send()
            .await
            .map_err(|e| BillingError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejection_from(response).await);
        }

        Ok(())
    }
}
