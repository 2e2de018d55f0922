//! Collaborator store interfaces.
//!
//! The engine reaches its persistence through these narrow traits so the
//! services can be exercised against in-memory implementations. The
//! Postgres implementations in [`postgres`] delegate to the query methods
//! in `fieldops-db`.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fieldops_db::models::{
    LifecycleEvent, NewLifecycleEvent, ResourceKind, SubscriptionEpisode, SubscriptionStatus,
    Tenant, TenantUpdate, UpdateOutcome,
};

use crate::error::BillingError;

pub use postgres::{
    PgLifecycleEventStore, PgResourceStore, PgSubscriptionHistoryStore, PgTenantStore,
};

/// Tenant rows and their conditional subscription updates.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Fetch a tenant by id.
    async fn get(&self, tenant_id: Uuid) -> Result<Option<Tenant>, BillingError>;

    /// Apply a subscription transition, conditional on the status the
    /// caller last read.
    async fn update(
        &self,
        tenant_id: Uuid,
        update: TenantUpdate,
        expected: SubscriptionStatus,
    ) -> Result<UpdateOutcome, BillingError>;

    /// Cancelled tenants whose paid-up period ended at or before `now`.
    async fn list_cancelled_due(&self, now: DateTime<Utc>) -> Result<Vec<Tenant>, BillingError>;

    /// Active tenants carrying an external subscription id.
    async fn list_active_with_subscription(&self) -> Result<Vec<Tenant>, BillingError>;
}

/// Counts and creation-ordered listings for quota-governed records.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// The true, unbounded count of records of a kind for a tenant.
    async fn count(&self, tenant_id: Uuid, kind: ResourceKind) -> Result<i64, BillingError>;

    /// Record ids in creation order, oldest first, optionally bounded.
    async fn list_ids_by_creation(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
        limit: Option<i64>,
    ) -> Result<Vec<Uuid>, BillingError>;
}

/// Append-only lifecycle event ledger.
#[async_trait]
pub trait LifecycleEventStore: Send + Sync {
    /// Append an event. The ledger is never updated in place.
    async fn append(&self, event: NewLifecycleEvent) -> Result<LifecycleEvent, BillingError>;

    /// The most recent event for a tenant.
    async fn latest(&self, tenant_id: Uuid) -> Result<Option<LifecycleEvent>, BillingError>;
}

/// Paid subscription history spans.
#[async_trait]
pub trait SubscriptionHistoryStore: Send + Sync {
    /// Open an episode for a freshly activated subscription.
    async fn open(
        &self,
        tenant_id: Uuid,
        external_subscription_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<SubscriptionEpisode, BillingError>;

    /// Close the single most recent episode for a tenant, recording the
    /// end of the paid-up period. Returns `None` when the tenant has no
    /// episode to close.
    async fn close_latest(
        &self,
        tenant_id: Uuid,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Option<SubscriptionEpisode>, BillingError>;
}
