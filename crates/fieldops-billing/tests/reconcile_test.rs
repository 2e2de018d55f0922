//! Integration tests for the scheduled reconciliation sweep.

mod common;

use common::{ts, GatewayScript, Harness};
use fieldops_billing::gateway::SubscriptionDetail;
use fieldops_db::models::{
    LifecycleEventSource, PlanTier, Quota, ResourceKind, SubscriptionStatus,
};

#[tokio::test]
async fn expires_cancelled_tenants_past_their_end_date() {
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(
            SubscriptionStatus::Cancelled,
            Some(ts(2025, 3, 1)),
            Some("sub_42"),
        )
        .await;

    let report = harness.lifecycle.reconcile_at(ts(2025, 3, 2)).await.unwrap();

    assert_eq!(report.expired, vec![tenant_id]);
    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Expired);
    assert_eq!(tenant.plan_tier, PlanTier::Free);

    let event = harness.lifecycle.latest_event(tenant_id).await.unwrap().unwrap();
    assert_eq!(event.previous_status, SubscriptionStatus::Cancelled);
    assert_eq!(event.new_status, SubscriptionStatus::Expired);
    assert_eq!(event.source, LifecycleEventSource::ScheduledReconciliation);
}

#[tokio::test]
async fn grace_period_holds_until_the_end_date_passes() {
    // Cancelled with the paid-up period running to 2025-03-01: still pro
    // on 2025-02-28, free after the sweep on 2025-03-02.
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(
            SubscriptionStatus::Cancelled,
            Some(ts(2025, 3, 1)),
            Some("sub_42"),
        )
        .await;

    let report = harness.lifecycle.reconcile_at(ts(2025, 2, 28)).await.unwrap();
    assert!(report.expired.is_empty());

    let quotas = harness.resolver.resolve(tenant_id).await.unwrap();
    assert_eq!(quotas.tier, PlanTier::Pro);
    assert!(quotas.quota_for(ResourceKind::Clients).is_unlimited());

    harness.lifecycle.reconcile_at(ts(2025, 3, 2)).await.unwrap();

    let quotas = harness.resolver.resolve(tenant_id).await.unwrap();
    assert_eq!(quotas.tier, PlanTier::Free);
    assert_eq!(quotas.quota_for(ResourceKind::Clients), Quota::Limited(3));
}

#[tokio::test]
async fn open_ended_cancellations_are_not_expired() {
    // No end date means the grace period has not been resolved yet; the
    // sweep leaves the tenant alone.
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(SubscriptionStatus::Cancelled, None, Some("sub_42"))
        .await;

    let report = harness.lifecycle.reconcile_at(ts(2030, 1, 1)).await.unwrap();

    assert!(report.expired.is_empty());
    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn a_lost_race_defers_the_tenant_to_the_next_sweep() {
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(
            SubscriptionStatus::Cancelled,
            Some(ts(2025, 3, 1)),
            Some("sub_42"),
        )
        .await;
    harness.tenants.force_conflicts(1);

    let report = harness.lifecycle.reconcile_at(ts(2025, 3, 2)).await.unwrap();

    assert!(report.expired.is_empty());
    assert_eq!(report.skipped_conflicts, 1);
    assert!(harness.ledger.events_for(tenant_id).await.is_empty());

    // The next cycle picks the tenant up.
    let report = harness.lifecycle.reconcile_at(ts(2025, 3, 3)).await.unwrap();
    assert_eq!(report.expired, vec![tenant_id]);
}

#[tokio::test]
async fn stale_active_tenant_is_cancelled_from_provider_state() {
    // A crash after the provider confirmed a cancel but before the local
    // write leaves the tenant active locally. The sweep cross-checks the
    // provider and applies the missing cancellation.
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(SubscriptionStatus::Active, None, Some("sub_42"))
        .await;
    harness
        .gateway
        .script_detail(GatewayScript::Respond(SubscriptionDetail {
            next_billing_at: Some(ts(2025, 3, 1)),
            cancelled: true,
        }))
        .await;

    let report = harness.lifecycle.reconcile_at(ts(2025, 2, 1)).await.unwrap();

    assert_eq!(report.externally_cancelled, vec![tenant_id]);
    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Cancelled);
    assert_eq!(tenant.subscription_ends_at, Some(ts(2025, 3, 1)));
    assert_eq!(tenant.plan_tier, PlanTier::Pro);

    let event = harness.lifecycle.latest_event(tenant_id).await.unwrap().unwrap();
    assert_eq!(event.source, LifecycleEventSource::ScheduledReconciliation);
}

#[tokio::test]
async fn healthy_active_tenants_are_left_alone() {
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(SubscriptionStatus::Active, None, Some("sub_42"))
        .await;

    let report = harness.lifecycle.reconcile_at(ts(2025, 2, 1)).await.unwrap();

    assert!(report.externally_cancelled.is_empty());
    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn gateway_outage_defers_the_cross_check() {
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(SubscriptionStatus::Active, None, Some("sub_42"))
        .await;
    harness
        .gateway
        .script_detail(GatewayScript::Unavailable)
        .await;

    let report = harness.lifecycle.reconcile_at(ts(2025, 2, 1)).await.unwrap();

    assert_eq!(report.gateway_failures, 1);
    assert!(report.externally_cancelled.is_empty());
    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Active);

    // Provider back up: the next sweep completes the cross-check.
    harness
        .gateway
        .script_detail(GatewayScript::Respond(SubscriptionDetail {
            next_billing_at: None,
            cancelled: true,
        }))
        .await;
    let report = harness.lifecycle.reconcile_at(ts(2025, 2, 2)).await.unwrap();
    assert_eq!(report.externally_cancelled, vec![tenant_id]);
}

#[tokio::test]
async fn full_lifecycle_from_checkout_to_expiry() {
    let harness = Harness::new();
    let tenant_id = harness
        .add_tenant(SubscriptionStatus::None, None, None)
        .await;

    harness.lifecycle.activate(tenant_id, "sub_42").await.unwrap();
    harness
        .gateway
        .script_detail(GatewayScript::Respond(SubscriptionDetail {
            next_billing_at: Some(ts(2025, 3, 1)),
            cancelled: false,
        }))
        .await;
    harness.lifecycle.cancel(tenant_id).await.unwrap();
    harness.lifecycle.reconcile_at(ts(2025, 3, 2)).await.unwrap();

    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Expired);
    assert_eq!(tenant.plan_tier, PlanTier::Free);

    let events = harness.ledger.events_for(tenant_id).await;
    let transitions: Vec<_> = events
        .iter()
        .map(|e| (e.previous_status, e.new_status))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (SubscriptionStatus::None, SubscriptionStatus::Active),
            (SubscriptionStatus::Active, SubscriptionStatus::Cancelled),
            (SubscriptionStatus::Cancelled, SubscriptionStatus::Expired),
        ]
    );

    // A fresh checkout re-enters the machine.
    harness.lifecycle.activate(tenant_id, "sub_43").await.unwrap();
    let tenant = harness.tenants.snapshot(tenant_id).await;
    assert_eq!(tenant.subscription_status, SubscriptionStatus::Active);
    assert_eq!(tenant.plan_tier, PlanTier::Pro);
}
