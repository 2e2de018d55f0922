//! In-memory collaborator implementations for exercising the engine
//! without a database.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use fieldops_billing::gateway::{SubscriptionDetail, SubscriptionGateway};
use fieldops_billing::store::{
    LifecycleEventStore, ResourceStore, SubscriptionHistoryStore, TenantStore,
};
use fieldops_billing::{
    AdmissionController, BillingError, QuotaResolver, SubscriptionLifecycleManager,
    VisibilityLimiter,
};
use fieldops_db::models::{
    LifecycleEvent, NewLifecycleEvent, PlanRegistry, PlanTier, ResourceKind, SubscriptionEpisode,
    SubscriptionStatus, Tenant, TenantUpdate, UpdateOutcome,
};

/// Build a UTC instant from a calendar date.
pub fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Tenant store over a `HashMap`, mirroring the conditional-update
/// semantics of the Postgres implementation.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
    forced_conflicts: AtomicUsize,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.id, tenant);
    }

    /// Make the next `n` updates report a conflict without applying.
    pub fn force_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn snapshot(&self, tenant_id: Uuid) -> Tenant {
        self.tenants
            .read()
            .await
            .get(&tenant_id)
            .cloned()
            .expect("tenant should exist")
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get(&self, tenant_id: Uuid) -> Result<Option<Tenant>, BillingError> {
        Ok(self.tenants.read().await.get(&tenant_id).cloned())
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        update: TenantUpdate,
        expected: SubscriptionStatus,
    ) -> Result<UpdateOutcome, BillingError> {
        if self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(UpdateOutcome::Conflict);
        }

        let mut tenants = self.tenants.write().await;
        let Some(tenant) = tenants.get_mut(&tenant_id) else {
            return Ok(UpdateOutcome::Conflict);
        };
        if tenant.subscription_status != expected {
            return Ok(UpdateOutcome::Conflict);
        }

        match update {
            TenantUpdate::Activate(fields) => {
                tenant.subscription_status = SubscriptionStatus::Active;
                tenant.plan_tier = PlanTier::Pro;
                tenant.subscription_ends_at = None;
                tenant.external_subscription_id = Some(fields.external_subscription_id);
            }
            TenantUpdate::Cancel(fields) => {
                tenant.subscription_status = SubscriptionStatus::Cancelled;
                if let Some(ends_at) = fields.subscription_ends_at {
                    tenant.subscription_ends_at = Some(ends_at);
                }
            }
            TenantUpdate::Expire => {
                tenant.subscription_status = SubscriptionStatus::Expired;
                tenant.plan_tier = PlanTier::Free;
            }
        }
        tenant.updated_at = Utc::now();

        Ok(UpdateOutcome::Applied)
    }

    async fn list_cancelled_due(&self, now: DateTime<Utc>) -> Result<Vec<Tenant>, BillingError> {
        Ok(self
            .tenants
            .read()
            .await
            .values()
            .filter(|t| {
                t.subscription_status == SubscriptionStatus::Cancelled
                    && t.subscription_ends_at.is_some_and(|ends_at| ends_at <= now)
            })
            .cloned()
            .collect())
    }

    async fn list_active_with_subscription(&self) -> Result<Vec<Tenant>, BillingError> {
        Ok(self
            .tenants
            .read()
            .await
            .values()
            .filter(|t| {
                t.subscription_status == SubscriptionStatus::Active
                    && t.external_subscription_id.is_some()
            })
            .cloned()
            .collect())
    }
}

/// Resource store over per-kind row vectors.
#[derive(Default)]
pub struct InMemoryResourceStore {
    rows: RwLock<HashMap<(Uuid, ResourceKind), Vec<(Uuid, DateTime<Utc>)>>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_row(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.rows
            .write()
            .await
            .entry((tenant_id, kind))
            .or_default()
            .push((id, created_at));
        id
    }

    /// Insert `n` rows one minute apart starting at `base`, returning the
    /// ids in creation order.
    pub async fn seed(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
        n: usize,
        base: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let created_at = base + chrono::Duration::minutes(i as i64);
            ids.push(self.insert_row(tenant_id, kind, created_at).await);
        }
        ids
    }

    pub async fn remove_row(&self, tenant_id: Uuid, kind: ResourceKind, id: Uuid) {
        if let Some(rows) = self.rows.write().await.get_mut(&(tenant_id, kind)) {
            rows.retain(|(row_id, _)| *row_id != id);
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn count(&self, tenant_id: Uuid, kind: ResourceKind) -> Result<i64, BillingError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&(tenant_id, kind))
            .map_or(0, |rows| rows.len() as i64))
    }

    async fn list_ids_by_creation(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
        limit: Option<i64>,
    ) -> Result<Vec<Uuid>, BillingError> {
        let mut rows = self
            .rows
            .read()
            .await
            .get(&(tenant_id, kind))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|(id, created_at)| (*created_at, *id));

        let mut ids: Vec<Uuid> = rows.into_iter().map(|(id, _)| id).collect();
        if let Some(limit) = limit {
            ids.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(ids)
    }
}

/// Append-only ledger over a vector.
#[derive(Default)]
pub struct InMemoryLedger {
    events: RwLock<Vec<LifecycleEvent>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events_for(&self, tenant_id: Uuid) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LifecycleEventStore for InMemoryLedger {
    async fn append(&self, event: NewLifecycleEvent) -> Result<LifecycleEvent, BillingError> {
        let row = LifecycleEvent {
            id: Uuid::new_v4(),
            tenant_id: event.tenant_id,
            previous_status: event.previous_status,
            new_status: event.new_status,
            effective_at: event.effective_at,
            source: event.source,
            created_at: Utc::now(),
        };
        self.events.write().await.push(row.clone());
        Ok(row)
    }

    async fn latest(&self, tenant_id: Uuid) -> Result<Option<LifecycleEvent>, BillingError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .enumerate()
            .filter(|(_, e)| e.tenant_id == tenant_id)
            .max_by_key(|(i, e)| (e.effective_at, e.created_at, *i))
            .map(|(_, e)| e.clone()))
    }
}

/// Subscription history over a vector; closing touches exactly the most
/// recent episode.
#[derive(Default)]
pub struct InMemoryHistory {
    episodes: RwLock<Vec<SubscriptionEpisode>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn episodes_for(&self, tenant_id: Uuid) -> Vec<SubscriptionEpisode> {
        self.episodes
            .read()
            .await
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubscriptionHistoryStore for InMemoryHistory {
    async fn open(
        &self,
        tenant_id: Uuid,
        external_subscription_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<SubscriptionEpisode, BillingError> {
        let episode = SubscriptionEpisode {
            id: Uuid::new_v4(),
            tenant_id,
            external_subscription_id: external_subscription_id.to_string(),
            started_at,
            ends_at: None,
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
        };
        self.episodes.write().await.push(episode.clone());
        Ok(episode)
    }

    async fn close_latest(
        &self,
        tenant_id: Uuid,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Option<SubscriptionEpisode>, BillingError> {
        let mut episodes = self.episodes.write().await;
        let Some(index) = episodes
            .iter()
            .enumerate()
            .filter(|(_, e)| e.tenant_id == tenant_id)
            .max_by_key(|(i, e)| (e.started_at, e.created_at, *i))
            .map(|(i, _)| i)
        else {
            return Ok(None);
        };

        episodes[index].status = SubscriptionStatus::Cancelled;
        episodes[index].ends_at = ends_at;
        Ok(Some(episodes[index].clone()))
    }
}

/// What a scripted gateway call should do.
#[derive(Debug, Clone)]
pub enum GatewayScript {
    Respond(SubscriptionDetail),
    Unavailable,
    Rejected,
}

impl GatewayScript {
    fn detail(&self) -> Result<SubscriptionDetail, BillingError> {
        match self {
            GatewayScript::Respond(detail) => Ok(detail.clone()),
            GatewayScript::Unavailable => Err(BillingError::GatewayUnavailable(
                "scripted outage".to_string(),
            )),
            GatewayScript::Rejected => Err(BillingError::GatewayRejected(
                "scripted rejection".to_string(),
            )),
        }
    }
}

/// Gateway double with per-endpoint scripts and call counters.
pub struct ScriptedGateway {
    detail_script: RwLock<GatewayScript>,
    cancel_script: RwLock<GatewayScript>,
    pub detail_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            detail_script: RwLock::new(GatewayScript::Respond(SubscriptionDetail::default())),
            cancel_script: RwLock::new(GatewayScript::Respond(SubscriptionDetail::default())),
            detail_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script_detail(&self, script: GatewayScript) {
        *self.detail_script.write().await = script;
    }

    pub async fn script_cancel(&self, script: GatewayScript) {
        *self.cancel_script.write().await = script;
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionGateway for ScriptedGateway {
    async fn get_detail(
        &self,
        _external_subscription_id: &str,
    ) -> Result<SubscriptionDetail, BillingError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.detail_script.read().await.detail()
    }

    async fn cancel(
        &self,
        _external_subscription_id: &str,
        _reason: &str,
    ) -> Result<(), BillingError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel_script.read().await.detail().map(|_| ())
    }
}

/// Fully wired engine over the in-memory collaborators.
pub struct Harness {
    pub tenants: Arc<InMemoryTenantStore>,
    pub resources: Arc<InMemoryResourceStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub history: Arc<InMemoryHistory>,
    pub gateway: Arc<ScriptedGateway>,
    pub resolver: QuotaResolver,
    pub admission: AdmissionController,
    pub visibility: VisibilityLimiter,
    pub lifecycle: SubscriptionLifecycleManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registry(PlanRegistry::default())
    }

    pub fn with_registry(registry: PlanRegistry) -> Self {
        let tenants = Arc::new(InMemoryTenantStore::new());
        let resources = Arc::new(InMemoryResourceStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let history = Arc::new(InMemoryHistory::new());
        let gateway = Arc::new(ScriptedGateway::new());

        let resolver = QuotaResolver::new(tenants.clone(), registry);
        let admission = AdmissionController::new(resolver.clone(), resources.clone());
        let visibility = VisibilityLimiter::new(resolver.clone(), resources.clone());
        let lifecycle = SubscriptionLifecycleManager::new(
            tenants.clone(),
            ledger.clone(),
            history.clone(),
            gateway.clone(),
        );

        Self {
            tenants,
            resources,
            ledger,
            history,
            gateway,
            resolver,
            admission,
            visibility,
            lifecycle,
        }
    }

    /// Insert a tenant in the given subscription state and return its id.
    pub async fn add_tenant(
        &self,
        status: SubscriptionStatus,
        subscription_ends_at: Option<DateTime<Utc>>,
        external_subscription_id: Option<&str>,
    ) -> Uuid {
        let plan_tier = match status {
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled => PlanTier::Pro,
            SubscriptionStatus::None | SubscriptionStatus::Expired => PlanTier::Free,
        };
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Acme Restoration".to_string(),
            plan_tier,
            subscription_status: status,
            subscription_ends_at,
            external_subscription_id: external_subscription_id.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = tenant.id;
        self.tenants.insert(tenant).await;
        id
    }
}
