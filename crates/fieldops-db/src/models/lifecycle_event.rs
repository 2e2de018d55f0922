//! Subscription lifecycle event ledger.
//!
//! Append-only history of subscription status transitions, kept for audit
//! trails and most-recent-status queries. Rows are never updated or
//! deleted; the tenant's own status field is the current truth and is kept
//! in sync by whichever operation appends the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::tenant::SubscriptionStatus;

/// What triggered a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lifecycle_event_source", rename_all = "snake_case")]
pub enum LifecycleEventSource {
    /// A user-initiated action (checkout, cancel button).
    UserAction,
    /// A notification from the external billing provider.
    ExternalNotification,
    /// The periodic reconciliation sweep.
    ScheduledReconciliation,
}

impl LifecycleEventSource {
    /// Get the source as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEventSource::UserAction => "user_action",
            LifecycleEventSource::ExternalNotification => "external_notification",
            LifecycleEventSource::ScheduledReconciliation => "scheduled_reconciliation",
        }
    }
}

impl std::fmt::Display for LifecycleEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded subscription status transition.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// Tenant the transition belongs to.
    pub tenant_id: Uuid,
    /// Status before the transition.
    pub previous_status: SubscriptionStatus,
    /// Status after the transition.
    pub new_status: SubscriptionStatus,
    /// When the transition took effect.
    pub effective_at: DateTime<Utc>,
    /// What triggered the transition.
    pub source: LifecycleEventSource,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// Fields for appending a new lifecycle event.
#[derive(Debug, Clone)]
pub struct NewLifecycleEvent {
    pub tenant_id: Uuid,
    pub previous_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
    pub effective_at: DateTime<Utc>,
    pub source: LifecycleEventSource,
}

impl LifecycleEvent {
    /// Append an event to the ledger.
    pub async fn append(pool: &PgPool, event: &NewLifecycleEvent) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO subscription_lifecycle_events
                (tenant_id, previous_status, new_status, effective_at, source)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_id, previous_status, new_status, effective_at, source, created_at
            ",
        )
        .bind(event.tenant_id)
        .bind(event.previous_status)
        .bind(event.new_status)
        .bind(event.effective_at)
        .bind(event.source)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// The most recent event for a tenant.
    ///
    /// Selected by latest `effective_at` with insertion order as the
    /// tie-break, so concurrent writers still resolve to a single row.
    pub async fn latest(pool: &PgPool, tenant_id: Uuid) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, tenant_id, previous_status, new_status, effective_at, source, created_at
            FROM subscription_lifecycle_events
            WHERE tenant_id = $1
            ORDER BY effective_at DESC, created_at DESC
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Recent events for a tenant, newest first.
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, tenant_id, previous_status, new_status, effective_at, source, created_at
            FROM subscription_lifecycle_events
            WHERE tenant_id = $1
            ORDER BY effective_at DESC, created_at DESC
            LIMIT $2
            ",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }
}
