//! Subscription lifecycle management.
//!
//! Owns the tenant subscription state machine:
//!
//! ```text
//! none --(checkout succeeds)--> active
//! active --(user cancels)--> cancelled
//! active --(provider reports non-payment)--> cancelled
//! cancelled --(grace period elapses)--> expired
//! expired --(checkout succeeds again)--> active
//! ```
//!
//! Every transition is a conditional update keyed on the subscription
//! status the caller last read. A lost race is retried once with a fresh
//! read and then surfaced as `ConcurrentModification`; the reconciliation
//! sweep instead skips the tenant and picks it up on the next cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use fieldops_db::models::{
    ActivateUpdate, CancelUpdate, LifecycleEvent, LifecycleEventSource, NewLifecycleEvent,
    SubscriptionStatus, Tenant, TenantUpdate, UpdateOutcome,
};

use crate::error::BillingError;
use crate::gateway::SubscriptionGateway;
use crate::store::{LifecycleEventStore, SubscriptionHistoryStore, TenantStore};

/// Reason sent to the provider with a user-initiated cancellation.
const CANCEL_REASON: &str = "customer_request";

/// What one reconciliation sweep did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    /// Tenants whose grace period ended and who were downgraded to free.
    pub expired: Vec<Uuid>,
    /// Active tenants the provider reported as cancelled.
    pub externally_cancelled: Vec<Uuid>,
    /// Tenants skipped because their status changed mid-sweep.
    pub skipped_conflicts: usize,
    /// Gateway calls that failed; those tenants retry next sweep.
    pub gateway_failures: usize,
}

/// Owns every mutation of a tenant's subscription fields.
pub struct SubscriptionLifecycleManager {
    tenants: Arc<dyn TenantStore>,
    ledger: Arc<dyn LifecycleEventStore>,
    history: Arc<dyn SubscriptionHistoryStore>,
    gateway: Arc<dyn SubscriptionGateway>,
}

impl SubscriptionLifecycleManager {
    /// Create a lifecycle manager.
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        ledger: Arc<dyn LifecycleEventStore>,
        history: Arc<dyn SubscriptionHistoryStore>,
        gateway: Arc<dyn SubscriptionGateway>,
    ) -> Self {
        Self {
            tenants,
            ledger,
            history,
            gateway,
        }
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Tenant, BillingError> {
        self.tenants
            .get(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))
    }

    /// The most recent lifecycle event for a tenant.
    pub async fn latest_event(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<LifecycleEvent>, BillingError> {
        self.ledger.latest(tenant_id).await
    }

    /// Record a successful checkout: `none`/`expired` -> `active`.
    ///
    /// Raises the tier to pro, stores the provider's subscription id, and
    /// opens a history episode. A checkout for an already-active tenant is
    /// a no-op.
    pub async fn activate(
        &self,
        tenant_id: Uuid,
        external_subscription_id: &str,
    ) -> Result<(), BillingError> {
        let tenant = self.get_tenant(tenant_id).await?;
        let mut previous = tenant.subscription_status;

        match previous {
            SubscriptionStatus::Active => {
                tracing::debug!(tenant_id = %tenant_id, "Checkout for an already-active tenant, no-op");
                return Ok(());
            }
            SubscriptionStatus::Cancelled => {
                // A cancelled tenant still has paid access; there is
                // nothing to buy until the grace period expires.
                return Err(BillingError::InvalidTransition {
                    tenant_id,
                    from: SubscriptionStatus::Cancelled,
                    to: SubscriptionStatus::Active,
                });
            }
            SubscriptionStatus::None | SubscriptionStatus::Expired => {}
        }

        let now = Utc::now();
        let update = TenantUpdate::Activate(ActivateUpdate {
            external_subscription_id: external_subscription_id.to_string(),
        });

        match self.tenants.update(tenant_id, update.clone(), previous).await? {
            UpdateOutcome::Applied => {}
            UpdateOutcome::Conflict => {
                let fresh = self.get_tenant(tenant_id).await?;
                match fresh.subscription_status {
                    SubscriptionStatus::Active => {
                        tracing::debug!(tenant_id = %tenant_id, "Concurrent checkout already activated the tenant");
                        return Ok(());
                    }
                    SubscriptionStatus::None | SubscriptionStatus::Expired => {
                        previous = fresh.subscription_status;
                        match self.tenants.update(tenant_id, update, previous).await? {
                            UpdateOutcome::Applied => {}
                            UpdateOutcome::Conflict => {
                                return Err(BillingError::ConcurrentModification(tenant_id));
                            }
                        }
                    }
                    SubscriptionStatus::Cancelled => {
                        return Err(BillingError::ConcurrentModification(tenant_id));
                    }
                }
            }
        }

        self.ledger
            .append(NewLifecycleEvent {
                tenant_id,
                previous_status: previous,
                new_status: SubscriptionStatus::Active,
                effective_at: now,
                source: LifecycleEventSource::UserAction,
            })
            .await?;
        self.history
            .open(tenant_id, external_subscription_id, now)
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            external_subscription_id = %external_subscription_id,
            "Subscription activated"
        );
        Ok(())
    }

    /// Cancel a tenant's subscription: `active` -> `cancelled`.
    ///
    /// The paid tier is kept through the grace period; only the later
    /// expiry transition downgrades it. A second cancel on an
    /// already-cancelled tenant is a no-op returning success.
    ///
    /// The operation either fully fails with no local change, or fully
    /// succeeds with the tenant row, ledger, and history updated.
    pub async fn cancel(&self, tenant_id: Uuid) -> Result<(), BillingError> {
        let tenant = self.get_tenant(tenant_id).await?;

        match tenant.subscription_status {
            SubscriptionStatus::Cancelled => {
                tracing::debug!(tenant_id = %tenant_id, "Tenant already cancelled, no-op");
                return Ok(());
            }
            from @ (SubscriptionStatus::None | SubscriptionStatus::Expired) => {
                return Err(BillingError::InvalidTransition {
                    tenant_id,
                    from,
                    to: SubscriptionStatus::Cancelled,
                });
            }
            SubscriptionStatus::Active => {}
        }

        // The detail query is advisory: it only improves the grace date.
        // Cancellation must still be honorable locally when the provider
        // cannot be asked.
        let detail = match &tenant.external_subscription_id {
            Some(external_id) => match self.gateway.get_detail(external_id).await {
                Ok(detail) => Some(detail),
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        error = %e,
                        "Could not fetch subscription detail before cancel, proceeding without it"
                    );
                    None
                }
            },
            None => None,
        };

        // The cancel instruction is not advisory. If the provider does not
        // confirm, nothing changes locally: the tenant keeps full access
        // rather than being granted a downgrade the provider never agreed
        // to.
        if let Some(external_id) = &tenant.external_subscription_id {
            self.gateway.cancel(external_id, CANCEL_REASON).await?;
        }

        // The provider's next billing date is the date the tenant already
        // paid up to, and wins over anything stored locally. Without it,
        // the stored end date stays untouched.
        let external_end = detail.as_ref().and_then(|d| d.next_billing_at);

        let now = Utc::now();
        let update = TenantUpdate::Cancel(CancelUpdate {
            subscription_ends_at: external_end,
        });

        match self
            .tenants
            .update(tenant_id, update.clone(), SubscriptionStatus::Active)
            .await?
        {
            UpdateOutcome::Applied => {}
            UpdateOutcome::Conflict => {
                let fresh = self.get_tenant(tenant_id).await?;
                match fresh.subscription_status {
                    SubscriptionStatus::Cancelled => {
                        tracing::debug!(tenant_id = %tenant_id, "Concurrent caller already cancelled the tenant");
                        return Ok(());
                    }
                    SubscriptionStatus::Active => {
                        match self
                            .tenants
                            .update(tenant_id, update, SubscriptionStatus::Active)
                            .await?
                        {
                            UpdateOutcome::Applied => {}
                            UpdateOutcome::Conflict => {
                                return Err(BillingError::ConcurrentModification(tenant_id));
                            }
                        }
                    }
                    _ => return Err(BillingError::ConcurrentModification(tenant_id)),
                }
            }
        }

        self.ledger
            .append(NewLifecycleEvent {
                tenant_id,
                previous_status: SubscriptionStatus::Active,
                new_status: SubscriptionStatus::Cancelled,
                effective_at: now,
                source: LifecycleEventSource::UserAction,
            })
            .await?;

        let resolved_end = external_end.or(tenant.subscription_ends_at);
        self.history.close_latest(tenant_id, resolved_end).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_ends_at = ?resolved_end,
            "Subscription cancelled"
        );
        Ok(())
    }

    /// Apply a provider-reported cancellation (for example non-payment):
    /// `active` -> `cancelled`.
    ///
    /// `ends_at` is the paid-up date carried by the notification; `None`
    /// leaves the stored end date untouched. Idempotent for tenants that
    /// are already cancelled.
    pub async fn record_external_cancellation(
        &self,
        tenant_id: Uuid,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<(), BillingError> {
        let tenant = self.get_tenant(tenant_id).await?;

        match tenant.subscription_status {
            SubscriptionStatus::Cancelled => {
                tracing::debug!(tenant_id = %tenant_id, "Provider cancellation for an already-cancelled tenant, no-op");
                return Ok(());
            }
            from @ (SubscriptionStatus::None | SubscriptionStatus::Expired) => {
                return Err(BillingError::InvalidTransition {
                    tenant_id,
                    from,
                    to: SubscriptionStatus::Cancelled,
                });
            }
            SubscriptionStatus::Active => {}
        }

        let now = Utc::now();
        let update = TenantUpdate::Cancel(CancelUpdate {
            subscription_ends_at: ends_at,
        });

        match self
            .tenants
            .update(tenant_id, update.clone(), SubscriptionStatus::Active)
            .await?
        {
            UpdateOutcome::Applied => {}
            UpdateOutcome::Conflict => {
                let fresh = self.get_tenant(tenant_id).await?;
                match fresh.subscription_status {
                    SubscriptionStatus::Cancelled => return Ok(()),
                    SubscriptionStatus::Active => {
                        match self
                            .tenants
                            .update(tenant_id, update, SubscriptionStatus::Active)
                            .await?
                        {
                            UpdateOutcome::Applied => {}
                            UpdateOutcome::Conflict => {
                                return Err(BillingError::ConcurrentModification(tenant_id));
                            }
                        }
                    }
                    _ => return Err(BillingError::ConcurrentModification(tenant_id)),
                }
            }
        }

        self.ledger
            .append(NewLifecycleEvent {
                tenant_id,
                previous_status: SubscriptionStatus::Active,
                new_status: SubscriptionStatus::Cancelled,
                effective_at: now,
                source: LifecycleEventSource::ExternalNotification,
            })
            .await?;
        self.history
            .close_latest(tenant_id, ends_at.or(tenant.subscription_ends_at))
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_ends_at = ?ends_at,
            "Subscription cancelled on provider notification"
        );
        Ok(())
    }

    /// Run one reconciliation sweep at the current instant.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, BillingError> {
        self.reconcile_at(Utc::now()).await
    }

    /// Run one reconciliation sweep as of `now`.
    ///
    /// Two passes:
    ///
    /// 1. Cancelled tenants whose paid-up period ended are transitioned to
    ///    `expired` and downgraded to the free tier. This is the only path
    ///    that ever downgrades `plan_tier`.
    /// 2. Active tenants are cross-checked against the provider, catching
    ///    a cancellation that was confirmed externally but never persisted
    ///    locally (for example a crash between the two writes). A gateway
    ///    failure skips the tenant until the next sweep.
    ///
    /// Safe to run concurrently with user-initiated transitions: every
    /// write is conditional on the status read by this sweep, and a lost
    /// race just defers the tenant to the next cycle.
    pub async fn reconcile_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport, BillingError> {
        let mut report = ReconciliationReport::default();

        for tenant in self.tenants.list_cancelled_due(now).await? {
            match self
                .tenants
                .update(tenant.id, TenantUpdate::Expire, SubscriptionStatus::Cancelled)
                .await?
            {
                UpdateOutcome::Applied => {
                    self.ledger
                        .append(NewLifecycleEvent {
                            tenant_id: tenant.id,
                            previous_status: SubscriptionStatus::Cancelled,
                            new_status: SubscriptionStatus::Expired,
                            effective_at: now,
                            source: LifecycleEventSource::ScheduledReconciliation,
                        })
                        .await?;
                    tracing::info!(
                        tenant_id = %tenant.id,
                        "Grace period over, subscription expired and tenant downgraded to free"
                    );
                    report.expired.push(tenant.id);
                }
                UpdateOutcome::Conflict => {
                    tracing::debug!(
                        tenant_id = %tenant.id,
                        "Skipping expiry, subscription status changed concurrently"
                    );
                    report.skipped_conflicts += 1;
                }
            }
        }

        for tenant in self.tenants.list_active_with_subscription().await? {
            let Some(external_id) = tenant.external_subscription_id.clone() else {
                continue;
            };

            let detail = match self.gateway.get_detail(&external_id).await {
                Ok(detail) => detail,
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %tenant.id,
                        error = %e,
                        "Could not cross-check subscription with provider, will retry next sweep"
                    );
                    report.gateway_failures += 1;
                    continue;
                }
            };

            if !detail.cancelled {
                continue;
            }

            let external_end = detail.next_billing_at;
            match self
                .tenants
                .update(
                    tenant.id,
                    TenantUpdate::Cancel(CancelUpdate {
                        subscription_ends_at: external_end,
                    }),
                    SubscriptionStatus::Active,
                )
                .await?
            {
                UpdateOutcome::Applied => {
                    self.ledger
                        .append(NewLifecycleEvent {
                            tenant_id: tenant.id,
                            previous_status: SubscriptionStatus::Active,
                            new_status: SubscriptionStatus::Cancelled,
                            effective_at: now,
                            source: LifecycleEventSource::ScheduledReconciliation,
                        })
                        .await?;
                    self.history
                        .close_latest(tenant.id, external_end.or(tenant.subscription_ends_at))
                        .await?;
                    tracing::warn!(
                        tenant_id = %tenant.id,
                        "Provider reports subscription cancelled, local state was stale and is now updated"
                    );
                    report.externally_cancelled.push(tenant.id);
                }
                UpdateOutcome::Conflict => {
                    report.skipped_conflicts += 1;
                }
            }
        }

        Ok(report)
    }
}
