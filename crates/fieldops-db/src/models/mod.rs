//! Database models for the fieldops platform.

pub mod lifecycle_event;
pub mod plan;
pub mod resource;
pub mod subscription_episode;
pub mod tenant;

pub use lifecycle_event::{LifecycleEvent, LifecycleEventSource, NewLifecycleEvent};
pub use plan::{PlanDefinition, PlanRegistry, PlanTier, Quota, ResourceKind};
pub use subscription_episode::SubscriptionEpisode;
pub use tenant::{
    ActivateUpdate, CancelUpdate, SubscriptionStatus, Tenant, TenantUpdate, UpdateOutcome,
};
