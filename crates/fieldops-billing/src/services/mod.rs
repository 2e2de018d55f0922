//! Services for quota resolution, admission, visibility, and the
//! subscription lifecycle.

pub mod admission;
pub mod lifecycle;
pub mod quota;
pub mod visibility;

pub use admission::{AdmissionController, QuotaDecision, ResourceUsage, UsageReport};
pub use lifecycle::{ReconciliationReport, SubscriptionLifecycleManager};
pub use quota::{QuotaResolver, TenantQuotas};
pub use visibility::VisibilityLimiter;
