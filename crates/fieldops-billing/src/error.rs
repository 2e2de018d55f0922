//! Error types for the billing engine.
//!
//! Exceeding a quota is not an error: admission checks report it as a
//! normal `allowed = false` decision. Only infrastructure failures (store
//! or gateway unreachable), business-level gateway rejections, lost
//! optimistic updates, and invalid state transitions surface here.

use thiserror::Error;
use uuid::Uuid;

use fieldops_db::models::SubscriptionStatus;

/// Errors from the subscription lifecycle and quota engine.
#[derive(Debug, Error)]
pub enum BillingError {
    /// No tenant with the given id.
    #[error("Tenant {0} not found")]
    TenantNotFound(Uuid),

    /// The external billing gateway failed to respond.
    ///
    /// The triggering operation is retried at the next reconciliation
    /// sweep; this is never treated as success.
    #[error("Billing gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The external billing gateway responded with a business-level
    /// rejection. The triggering operation fails and the rejection is
    /// surfaced to the caller.
    #[error("Billing gateway rejected the request: {0}")]
    GatewayRejected(String),

    /// An optimistic subscription update lost its race and the retry
    /// lost again.
    #[error("Concurrent modification of tenant {0}: subscription status changed mid-operation")]
    ConcurrentModification(Uuid),

    /// The requested transition is not an edge of the subscription state
    /// machine.
    #[error("Invalid subscription transition for tenant {tenant_id}: {from} -> {to}")]
    InvalidTransition {
        tenant_id: Uuid,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// Gateway configuration is invalid.
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfiguration(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl BillingError {
    /// Wrap a database-layer error.
    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    /// Check if this error indicates the gateway did not respond.
    #[must_use]
    pub fn is_gateway_unavailable(&self) -> bool {
        matches!(self, BillingError::GatewayUnavailable(_))
    }

    /// Check if this error is a business-level gateway rejection.
    #[must_use]
    pub fn is_gateway_rejected(&self) -> bool {
        matches!(self, BillingError::GatewayRejected(_))
    }

    /// Check if this error is a lost optimistic update.
    #[must_use]
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, BillingError::ConcurrentModification(_))
    }
}
