//! Pre-write admission checks.
//!
//! `check` is invoked before creating a record so the caller can reject
//! with an accurate, user-facing "limit of N reached" message instead of
//! attempting a doomed write.
//!
//! The check is advisory by design. It is not transactionally linked to
//! the subsequent insert, so two concurrent creators can both observe
//! `allowed = true` and both succeed, leaving the tenant transiently over
//! quota. That overage is harmless: the visibility limiter keeps the
//! newest records invisible until a record is removed or the tenant
//! upgrades, so the quota invariant holds on every read. Do not "fix" the
//! race with a per-tenant lock; it would serialize all writes for a
//! tenant without changing what any reader can observe.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use fieldops_db::models::{PlanTier, ResourceKind};

use crate::error::BillingError;
use crate::services::quota::{QuotaResolver, TenantQuotas};
use crate::store::ResourceStore;

/// Outcome of one admission check. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaDecision {
    /// The kind that was checked.
    pub resource_kind: ResourceKind,
    /// The tenant's true record count of that kind, including records
    /// currently hidden by the visibility limiter.
    pub current_count: i64,
    /// The cap, or `None` for unlimited.
    pub limit: Option<i64>,
    /// Whether creating one more record stays within quota.
    pub allowed: bool,
}

impl QuotaDecision {
    /// A user-facing denial message, present only when the check failed.
    #[must_use]
    pub fn denial_message(&self) -> Option<String> {
        if self.allowed {
            return None;
        }
        self.limit.map(|limit| {
            format!(
                "Limit of {limit} {} reached. Upgrade your plan to add more.",
                self.resource_kind
            )
        })
    }
}

/// Per-kind usage entry in a [`UsageReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub resource_kind: ResourceKind,
    pub current_count: i64,
    pub limit: Option<i64>,
}

/// A tenant's usage across every resource kind.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub tenant_id: Uuid,
    pub tier: PlanTier,
    pub entries: Vec<ResourceUsage>,
}

/// Gates record creation against the tenant's resolved quotas.
#[derive(Clone)]
pub struct AdmissionController {
    resolver: QuotaResolver,
    resources: Arc<dyn ResourceStore>,
}

impl AdmissionController {
    /// Create an admission controller.
    pub fn new(resolver: QuotaResolver, resources: Arc<dyn ResourceStore>) -> Self {
        Self { resolver, resources }
    }

    /// Check whether a tenant may create one more record of a kind.
    ///
    /// Over-quota is a normal decision outcome, not an error; only store
    /// failures error here.
    pub async fn check(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
    ) -> Result<QuotaDecision, BillingError> {
        let quotas = self.resolver.resolve(tenant_id).await?;
        self.check_with(&quotas, kind).await
    }

    /// Check against quotas the caller already resolved this request.
    pub async fn check_with(
        &self,
        quotas: &TenantQuotas,
        kind: ResourceKind,
    ) -> Result<QuotaDecision, BillingError> {
        let quota = quotas.quota_for(kind);
        // The true total, not the visibility-limited view: a tenant over
        // quota must not be allowed to keep creating records just because
        // the overflow is hidden.
        let current_count = self.resources.count(quotas.tenant_id, kind).await?;

        let decision = QuotaDecision {
            resource_kind: kind,
            current_count,
            limit: quota.limit(),
            allowed: quota.permits(current_count),
        };

        if !decision.allowed {
            tracing::info!(
                tenant_id = %quotas.tenant_id,
                resource_kind = %kind,
                current_count = decision.current_count,
                limit = ?decision.limit,
                "Admission denied: quota reached"
            );
        }

        Ok(decision)
    }

    /// Usage across every resource kind for a tenant.
    pub async fn usage(&self, tenant_id: Uuid) -> Result<UsageReport, BillingError> {
        let quotas = self.resolver.resolve(tenant_id).await?;

        let mut entries = Vec::new();
        for kind in ResourceKind::all() {
            let current_count = self.resources.count(tenant_id, kind).await?;
            entries.push(ResourceUsage {
                resource_kind: kind,
                current_count,
                limit: quotas.quota_for(kind).limit(),
            });
        }

        Ok(UsageReport {
            tenant_id,
            tier: quotas.tier,
            entries,
        })
    }
}
