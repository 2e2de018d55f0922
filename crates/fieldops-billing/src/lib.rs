//! Subscription lifecycle and quota enforcement engine.
//!
//! Decides, per tenant, how many records of each resource kind may be
//! visible and creatable, gates creation attempts against that decision,
//! and tracks the tenant's paid-subscription state as it moves between
//! free, active, cancelled-with-grace-period, and expired, reconciling
//! against the external billing provider.
//!
//! ## Enforcement model
//!
//! Quota enforcement is split across two services with very different
//! guarantees:
//!
//! - [`services::AdmissionController`] is the soft gate. It is checked
//!   before a write so the caller can show an accurate "limit of N
//!   reached" message, but the check and the insert are not transactional.
//!   Two racing creators can both pass it.
//! - [`services::VisibilityLimiter`] is the hard gate. Listings are
//!   truncated to the oldest N records under a finite quota, so whatever
//!   slips past admission stays invisible rather than becoming a
//!   correctness problem. Records over quota are never deleted; an upgrade
//!   brings them back.
//!
//! Because the read path carries the invariant, admission checks take no
//! per-tenant lock. Do not add one: it would serialize every write for a
//! tenant without making the system any more correct.

pub mod config;
pub mod error;
pub mod gateway;
pub mod services;
pub mod store;

pub use config::GatewayConfig;
pub use error::BillingError;
pub use gateway::{HttpSubscriptionGateway, SubscriptionDetail, SubscriptionGateway};
pub use services::{
    AdmissionController, QuotaDecision, QuotaResolver, ReconciliationReport, ResourceUsage,
    SubscriptionLifecycleManager, TenantQuotas, UsageReport, VisibilityLimiter,
};
