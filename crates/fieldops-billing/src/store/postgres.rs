//! Postgres implementations of the collaborator stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use fieldops_db::models::{
    resource, LifecycleEvent, NewLifecycleEvent, ResourceKind, SubscriptionEpisode,
    SubscriptionStatus, Tenant, TenantUpdate, UpdateOutcome,
};

use crate::error::BillingError;
use crate::store::{
    LifecycleEventStore, ResourceStore, SubscriptionHistoryStore, TenantStore,
};

/// Tenant store backed by the `tenants` table.
#[derive(Debug, Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    /// Create a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn get(&self, tenant_id: Uuid) -> Result<Option<Tenant>, BillingError> {
        Tenant::find_by_id(&self.pool, tenant_id)
            .await
            .map_err(BillingError::database)
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        update: TenantUpdate,
        expected: SubscriptionStatus,
    ) -> Result<UpdateOutcome, BillingError> {
        Tenant::update_subscription(&self.pool, tenant_id, &update, expected)
            .await
            .map_err(BillingError::database)
    }

    async fn list_cancelled_due(&self, now: DateTime<Utc>) -> Result<Vec<Tenant>, BillingError> {
        Tenant::list_cancelled_due(&self.pool, now)
            .await
            .map_err(BillingError::database)
    }

    async fn list_active_with_subscription(&self) -> Result<Vec<Tenant>, BillingError> {
        Tenant::list_active_with_subscription(&self.pool)
            .await
            .map_err(BillingError::database)
    }
}

/// Resource store over the per-kind record tables.
#[derive(Debug, Clone)]
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    /// Create a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn count(&self, tenant_id: Uuid, kind: ResourceKind) -> Result<i64, BillingError> {
        resource::count_for_tenant(&self.pool, kind, tenant_id)
            .await
            .map_err(BillingError::database)
    }

    async fn list_ids_by_creation(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
        limit: Option<i64>,
    ) -> Result<Vec<Uuid>, BillingError> {
        resource::list_ids_by_creation(&self.pool, kind, tenant_id, limit)
            .await
            .map_err(BillingError::database)
    }
}

/// Ledger store backed by the `subscription_lifecycle_events` table.
#[derive(Debug, Clone)]
pub struct PgLifecycleEventStore {
    pool: PgPool,
}

impl PgLifecycleEventStore {
    /// Create a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LifecycleEventStore for PgLifecycleEventStore {
    async fn append(&self, event: NewLifecycleEvent) -> Result<LifecycleEvent, BillingError> {
        LifecycleEvent::append(&self.pool, &event)
            .await
            .map_err(BillingError::database)
    }

    async fn latest(&self, tenant_id: Uuid) -> Result<Option<LifecycleEvent>, BillingError> {
        LifecycleEvent::latest(&self.pool, tenant_id)
            .await
            .map_err(BillingError::database)
    }
}

/// History store backed by the `subscription_episodes` table.
#[derive(Debug, Clone)]
pub struct PgSubscriptionHistoryStore {
    pool: PgPool,
}

impl PgSubscriptionHistoryStore {
    /// Create a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionHistoryStore for PgSubscriptionHistoryStore {
    async fn open(
        &self,
        tenant_id: Uuid,
        external_subscription_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<SubscriptionEpisode, BillingError> {
        SubscriptionEpisode::open(&self.pool, tenant_id, external_subscription_id, started_at)
            .await
            .map_err(BillingError::database)
    }

    async fn close_latest(
        &self,
        tenant_id: Uuid,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Option<SubscriptionEpisode>, BillingError> {
        // Select the single most recent episode, then update that row by
        // id. Racing closers can only ever touch one row this way.
        let Some(latest) = SubscriptionEpisode::latest(&self.pool, tenant_id)
            .await
            .map_err(BillingError::database)?
        else {
            return Ok(None);
        };

        SubscriptionEpisode::close_by_id(&self.pool, latest.id, ends_at)
            .await
            .map(Some)
            .map_err(BillingError::database)
    }
}
