//! Tenant model and subscription field updates.
//!
//! A tenant's subscription fields (`plan_tier`, `subscription_status`,
//! `subscription_ends_at`, `external_subscription_id`) are mutated only
//! through the typed conditional updates in this module. Every update is
//! keyed on the status the caller last read, so a lost race surfaces as
//! `UpdateOutcome::Conflict` instead of silently clobbering a concurrent
//! transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::plan::PlanTier;

/// Subscription state of a tenant.
///
/// Transitions: `none -> active -> cancelled -> expired`, with `expired`
/// re-enterable via a fresh `active` transition. `cancelled` keeps paid
/// access until `subscription_ends_at` passes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Never subscribed.
    #[default]
    None,
    /// Paid subscription in good standing.
    Active,
    /// Cancelled but still inside the paid-up grace period.
    Cancelled,
    /// Grace period over; tenant is back on the free tier.
    Expired,
}

impl SubscriptionStatus {
    /// Get the status as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SubscriptionStatus::None),
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(format!("Invalid subscription status: {s}")),
        }
    }
}

/// A customer organization.
///
/// Tenants are created at signup on the free tier and never hard-deleted
/// by the billing engine.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique identifier for the tenant.
    pub id: Uuid,

    /// Human-readable name of the tenant (e.g., "Acme Restoration").
    pub name: String,

    /// Current plan tier. Downgraded to `free` only when the subscription
    /// expires; cancellation alone never changes it.
    pub plan_tier: PlanTier,

    /// Current subscription state.
    pub subscription_status: SubscriptionStatus,

    /// End of the paid-up period. Set on cancellation from the billing
    /// provider's next-billing date when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_ends_at: Option<DateTime<Utc>>,

    /// Opaque subscription identifier at the external billing provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_subscription_id: Option<String>,

    /// Timestamp when the tenant was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last subscription field change.
    pub updated_at: DateTime<Utc>,
}

/// Typed field set for the `active` transition.
#[derive(Debug, Clone)]
pub struct ActivateUpdate {
    /// Subscription identifier returned by the provider's checkout.
    pub external_subscription_id: String,
}

/// Typed field set for the `cancelled` transition.
#[derive(Debug, Clone)]
pub struct CancelUpdate {
    /// New end of the paid-up period. `Some` overwrites the stored value
    /// (the provider's next-billing date is authoritative); `None` leaves
    /// the stored value untouched.
    pub subscription_ends_at: Option<DateTime<Utc>>,
}

/// The subscription transitions a caller may apply.
///
/// Each variant pins exactly the fields that transition is allowed to
/// touch; there is no open field map.
#[derive(Debug, Clone)]
pub enum TenantUpdate {
    /// `none`/`expired` -> `active`: store the external subscription id,
    /// raise the tier to pro, clear any stale end date.
    Activate(ActivateUpdate),
    /// `active` -> `cancelled`: record the grace-period end. The tier is
    /// untouched; the downgrade happens at expiry.
    Cancel(CancelUpdate),
    /// `cancelled` -> `expired`: drop the tier to free. The only update
    /// that ever downgrades `plan_tier`.
    Expire,
}

/// Result of a conditional subscription update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The row matched the expected status and was updated.
    Applied,
    /// The status changed since it was read; nothing was written.
    Conflict,
}

impl Tenant {
    /// Whether the tenant has paid-tier access at the given instant.
    ///
    /// True while the subscription is `active`, and while `cancelled` with
    /// the paid-up period not yet over. An absent end date on a cancelled
    /// subscription means access until expiry is reconciled.
    #[must_use]
    pub fn has_paid_access(&self, at: DateTime<Utc>) -> bool {
        match self.subscription_status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Cancelled => self
                .subscription_ends_at
                .map_or(true, |ends_at| ends_at > at),
            SubscriptionStatus::None | SubscriptionStatus::Expired => false,
        }
    }

    /// Whether the tenant is inside a post-cancellation grace period.
    #[must_use]
    pub fn is_in_grace_period(&self, at: DateTime<Utc>) -> bool {
        self.subscription_status == SubscriptionStatus::Cancelled && self.has_paid_access(at)
    }

    /// Finds a tenant by its ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, name, plan_tier, subscription_status, subscription_ends_at, external_subscription_id, created_at, updated_at
            FROM tenants
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Create a new tenant on the free tier with no subscription.
    pub async fn create(pool: &PgPool, name: &str) -> Result<Self, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            INSERT INTO tenants (name)
            VALUES ($1)
            RETURNING id, name, plan_tier, subscription_status, subscription_ends_at, external_subscription_id, created_at, updated_at
            ",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// Apply a subscription transition, conditional on the status the
    /// caller last read.
    ///
    /// The read-modify-write is collapsed into a single conditional
    /// `UPDATE`; if the row no longer carries `expected`, no fields change
    /// and `UpdateOutcome::Conflict` is returned.
    pub async fn update_subscription(
        pool: &PgPool,
        id: Uuid,
        update: &TenantUpdate,
        expected: SubscriptionStatus,
    ) -> Result<UpdateOutcome, DbError> {
        let result = match update {
            TenantUpdate::Activate(fields) => {
                sqlx::query(
                    r"
                    UPDATE tenants
                    SET subscription_status = 'active',
                        plan_tier = 'pro',
                        subscription_ends_at = NULL,
                        external_subscription_id = $3,
                        updated_at = NOW()
                    WHERE id = $1 AND subscription_status = $2
                    ",
                )
                .bind(id)
                .bind(expected)
                .bind(&fields.external_subscription_id)
                .execute(pool)
                .await
            }
            TenantUpdate::Cancel(fields) => {
                sqlx::query(
                    r"
                    UPDATE tenants
                    SET subscription_status = 'cancelled',
                        subscription_ends_at = COALESCE($3, subscription_ends_at),
                        updated_at = NOW()
                    WHERE id = $1 AND subscription_status = $2
                    ",
                )
                .bind(id)
                .bind(expected)
                .bind(fields.subscription_ends_at)
                .execute(pool)
                .await
            }
            TenantUpdate::Expire => {
                sqlx::query(
                    r"
                    UPDATE tenants
                    SET subscription_status = 'expired',
                        plan_tier = 'free',
                        updated_at = NOW()
                    WHERE id = $1 AND subscription_status = $2
                    ",
                )
                .bind(id)
                .bind(expected)
                .execute(pool)
                .await
            }
        }
        .map_err(DbError::QueryFailed)?;

        if result.rows_affected() > 0 {
            Ok(UpdateOutcome::Applied)
        } else {
            Ok(UpdateOutcome::Conflict)
        }
    }

    /// List cancelled tenants whose paid-up period ended at or before `now`.
    ///
    /// These are the expiry candidates for the reconciliation sweep.
    pub async fn list_cancelled_due(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, name, plan_tier, subscription_status, subscription_ends_at, external_subscription_id, created_at, updated_at
            FROM tenants
            WHERE subscription_status = 'cancelled'
              AND subscription_ends_at IS NOT NULL
              AND subscription_ends_at <= $1
            ORDER BY subscription_ends_at ASC
            ",
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }

    /// List active tenants that carry an external subscription id.
    ///
    /// Used by the reconciliation sweep to cross-check local state against
    /// the billing provider.
    pub async fn list_active_with_subscription(pool: &PgPool) -> Result<Vec<Self>, DbError> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT id, name, plan_tier, subscription_status, subscription_ends_at, external_subscription_id, created_at, updated_at
            FROM tenants
            WHERE subscription_status = 'active'
              AND external_subscription_id IS NOT NULL
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(pool)
        .await
        .map_err(DbError::QueryFailed)
    }
}
