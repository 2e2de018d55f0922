//! Quota resolution.
//!
//! Maps a tenant to its effective per-resource-kind quota set by reading
//! the stored `plan_tier` and looking it up in the plan registry. The
//! stored tier is already reconciled by the lifecycle manager; this
//! service never re-derives grace periods.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use fieldops_db::models::{PlanDefinition, PlanRegistry, PlanTier, Quota, ResourceKind};

use crate::error::BillingError;
use crate::store::TenantStore;

/// A tenant's resolved quota set.
///
/// One tenant read produces one of these; callers hold it for the
/// duration of a request and look up as many kinds as they need, so a
/// single request never resolves the same tenant twice.
#[derive(Debug, Clone, Serialize)]
pub struct TenantQuotas {
    /// Tenant the quotas belong to.
    pub tenant_id: Uuid,
    /// The tier the quotas were resolved from.
    pub tier: PlanTier,
    /// The matching plan definition.
    pub definition: PlanDefinition,
}

impl TenantQuotas {
    /// The quota for a resource kind.
    #[must_use]
    pub fn quota_for(&self, kind: ResourceKind) -> Quota {
        self.definition.quota_for(kind)
    }
}

/// Resolves a tenant's effective quotas from its stored plan tier.
#[derive(Clone)]
pub struct QuotaResolver {
    tenants: Arc<dyn TenantStore>,
    registry: PlanRegistry,
}

impl QuotaResolver {
    /// Create a resolver over a tenant store and a plan registry.
    ///
    /// The registry is an injected value so tests can run with alternate
    /// plan tables.
    pub fn new(tenants: Arc<dyn TenantStore>, registry: PlanRegistry) -> Self {
        Self { tenants, registry }
    }

    /// Resolve the quota set for a tenant.
    pub async fn resolve(&self, tenant_id: Uuid) -> Result<TenantQuotas, BillingError> {
        let tenant = self
            .tenants
            .get(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;

        Ok(TenantQuotas {
            tenant_id,
            tier: tenant.plan_tier,
            definition: self.registry.definition(tenant.plan_tier).clone(),
        })
    }
}
