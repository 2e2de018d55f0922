//! Subscription history episodes.
//!
//! One row per paid subscription span. Activation opens an episode;
//! cancellation closes the single most recent one. Closing is a two-step
//! select-then-update keyed by row id, never a broad update over every row
//! matching the tenant, so racing writers can only ever touch one row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::tenant::SubscriptionStatus;

/// One paid subscription span for a tenant.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionEpisode {
    /// Unique identifier.
    pub id: Uuid,
    /// Tenant the episode belongs to.
    pub tenant_id: Uuid,
    /// Subscription identifier at the external billing provider.
    pub external_subscription_id: String,
    /// When the paid span started.
    pub started_at: DateTime<Utc>,
    /// End of the paid-up period, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// `active` while the span is open, `cancelled` once closed.
    pub status: SubscriptionStatus,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl SubscriptionEpisode {
    /// Open a new episode for a freshly activated subscription.
    pub async fn open(
        pool: &PgPool,
        tenant_id: Uuid,
        external_subscription_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO subscription_episodes
                (tenant_id, external_subscription_id, started_at, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING id, tenant_id, external_subscription_id, started_at, ends_at, status, created_at
            ",
        )
        .bind(tenant_id)
        .bind(external_subscription_id)
        .bind(started_at)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// The most recent episode for a tenant.
    pub async fn latest(pool: &PgPool, tenant_id: Uuid) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, tenant_id, external_subscription_id, started_at, ends_at, status, created_at
            FROM subscription_episodes
            WHERE tenant_id = $1
            ORDER BY started_at DESC, created_at DESC
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Close one episode by id, recording the end of the paid-up period.
    pub async fn close_by_id(
        pool: &PgPool,
        id: Uuid,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            UPDATE subscription_episodes
            SET status = 'cancelled', ends_at = $2
            WHERE id = $1
            RETURNING id, tenant_id, external_subscription_id, started_at, ends_at, status, created_at
            ",
        )
        .bind(id)
        .bind(ends_at)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }
}
