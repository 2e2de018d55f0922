//! Read-path quota enforcement.
//!
//! Bounds listings to the oldest N records when the resolved quota is
//! finite. This is the hard enforcement point: even when an admission
//! check is bypassed or racy, no listing, export, or relationship join
//! ever surfaces more than the quota. Rows are never deleted or mutated
//! to enforce a cap, so a downgraded tenant that upgrades again regains
//! every previously hidden record.
//!
//! Oldest-first is deliberate: creation order is monotonic per tenant, so
//! the visible set is stable across repeated calls and across concurrent
//! writers, with no arbitrary tie-break.

use std::sync::Arc;

use uuid::Uuid;

use fieldops_db::models::ResourceKind;

use crate::error::BillingError;
use crate::services::quota::{QuotaResolver, TenantQuotas};
use crate::store::ResourceStore;

/// Truncates listings to the quota-visible subset.
#[derive(Clone)]
pub struct VisibilityLimiter {
    resolver: QuotaResolver,
    resources: Arc<dyn ResourceStore>,
}

impl VisibilityLimiter {
    /// Create a visibility limiter.
    pub fn new(resolver: QuotaResolver, resources: Arc<dyn ResourceStore>) -> Self {
        Self { resolver, resources }
    }

    /// The listing bound for a tenant and kind: `Some(n)` caps the query
    /// at the oldest `n` rows, `None` leaves it unbounded.
    pub async fn limit(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Option<i64>, BillingError> {
        let quotas = self.resolver.resolve(tenant_id).await?;
        Ok(Self::limit_with(&quotas, kind))
    }

    /// The listing bound from quotas the caller already resolved this
    /// request.
    #[must_use]
    pub fn limit_with(quotas: &TenantQuotas, kind: ResourceKind) -> Option<i64> {
        quotas.quota_for(kind).limit()
    }

    /// The ids of the records a tenant may currently see, oldest first.
    ///
    /// Callers hydrate full rows from these ids; joins against other
    /// kinds go through the same bound so hidden records stay hidden
    /// everywhere.
    pub async fn list_visible(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Vec<Uuid>, BillingError> {
        let limit = self.limit(tenant_id, kind).await?;
        self.resources
            .list_ids_by_creation(tenant_id, kind, limit)
            .await
    }
}
