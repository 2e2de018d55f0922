//! Plan tiers, per-resource quotas, and the static plan table.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Available plan tiers in order from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
}

impl PlanTier {
    /// Get the numeric order of this tier (0 = lowest).
    #[must_use]
    pub fn tier_order(&self) -> i32 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Pro => 1,
        }
    }

    /// Check if this tier is higher than another.
    #[must_use]
    pub fn is_higher_than(&self, other: &PlanTier) -> bool {
        self.tier_order() > other.tier_order()
    }

    /// Get the plan name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }

    /// Get all available tiers in order.
    #[must_use]
    pub fn all() -> Vec<PlanTier> {
        vec![PlanTier::Free, PlanTier::Pro]
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            _ => Err(format!("Invalid plan tier: {s}")),
        }
    }
}

/// Every quota-governed record category on the platform.
///
/// The enumeration is closed: a kind that does not exist here cannot be
/// quota-checked at all, so there is no runtime "unknown kind" path.
/// Each kind maps to exactly one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Clients,
    Jobs,
    Estimates,
    Invoices,
    Technicians,
    Conversations,
    PartnerOrganizations,
}

impl ResourceKind {
    /// Get the kind name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Clients => "clients",
            ResourceKind::Jobs => "jobs",
            ResourceKind::Estimates => "estimates",
            ResourceKind::Invoices => "invoices",
            ResourceKind::Technicians => "technicians",
            ResourceKind::Conversations => "conversations",
            ResourceKind::PartnerOrganizations => "partner_organizations",
        }
    }

    /// The table holding records of this kind.
    ///
    /// Table names come from this closed enum only; they are never built
    /// from caller input.
    #[must_use]
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }

    /// Get all resource kinds.
    #[must_use]
    pub fn all() -> Vec<ResourceKind> {
        vec![
            ResourceKind::Clients,
            ResourceKind::Jobs,
            ResourceKind::Estimates,
            ResourceKind::Invoices,
            ResourceKind::Technicians,
            ResourceKind::Conversations,
            ResourceKind::PartnerOrganizations,
        ]
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clients" => Ok(ResourceKind::Clients),
            "jobs" => Ok(ResourceKind::Jobs),
            "estimates" => Ok(ResourceKind::Estimates),
            "invoices" => Ok(ResourceKind::Invoices),
            "technicians" => Ok(ResourceKind::Technicians),
            "conversations" => Ok(ResourceKind::Conversations),
            "partner_organizations" => Ok(ResourceKind::PartnerOrganizations),
            _ => Err(format!("Invalid resource kind: {s}")),
        }
    }
}

/// Maximum visible record count for one resource kind.
///
/// Serializes as the numeric cap, or `null` for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// At most this many records are visible and creatable.
    Limited(i64),
    /// No cap.
    Unlimited,
}

impl Quota {
    /// Whether a tenant currently holding `count` records may create one more.
    #[must_use]
    pub fn permits(&self, count: i64) -> bool {
        match self {
            Quota::Limited(cap) => count < *cap,
            Quota::Unlimited => true,
        }
    }

    /// The numeric cap, or `None` for unlimited.
    #[must_use]
    pub fn limit(&self) -> Option<i64> {
        match self {
            Quota::Limited(cap) => Some(*cap),
            Quota::Unlimited => None,
        }
    }

    /// Check if this quota is unlimited.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Quota::Unlimited)
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quota::Limited(cap) => write!(f, "{cap}"),
            Quota::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.limit().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<i64>::deserialize(deserializer)? {
            Some(cap) if cap >= 0 => Ok(Quota::Limited(cap)),
            Some(cap) => Err(de::Error::custom(format!("negative quota cap: {cap}"))),
            None => Ok(Quota::Unlimited),
        }
    }
}

/// Plan definition with per-resource-kind quotas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDefinition {
    /// Plan tier.
    pub tier: PlanTier,
    /// Display name.
    pub display_name: String,
    /// Maximum visible clients.
    pub max_clients: Quota,
    /// Maximum visible jobs.
    pub max_jobs: Quota,
    /// Maximum visible estimates.
    pub max_estimates: Quota,
    /// Maximum visible invoices.
    pub max_invoices: Quota,
    /// Maximum visible technicians.
    pub max_technicians: Quota,
    /// Maximum visible conversations.
    pub max_conversations: Quota,
    /// Maximum visible partner organizations.
    pub max_partner_organizations: Quota,
}

impl PlanDefinition {
    /// Get the built-in definition for a plan tier.
    #[must_use]
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self {
                tier,
                display_name: "Free".to_string(),
                max_clients: Quota::Limited(3),
                max_jobs: Quota::Limited(3),
                max_estimates: Quota::Limited(3),
                max_invoices: Quota::Limited(3),
                max_technicians: Quota::Limited(2),
                max_conversations: Quota::Limited(5),
                max_partner_organizations: Quota::Limited(2),
            },
            PlanTier::Pro => Self {
                tier,
                display_name: "Pro".to_string(),
                max_clients: Quota::Unlimited,
                max_jobs: Quota::Unlimited,
                max_estimates: Quota::Unlimited,
                max_invoices: Quota::Unlimited,
                max_technicians: Quota::Unlimited,
                max_conversations: Quota::Unlimited,
                max_partner_organizations: Quota::Unlimited,
            },
        }
    }

    /// Get all built-in plan definitions.
    #[must_use]
    pub fn all() -> Vec<Self> {
        PlanTier::all().into_iter().map(Self::for_tier).collect()
    }

    /// Look up the quota for a resource kind.
    ///
    /// Total over the closed `ResourceKind` enum; there is no error path.
    #[must_use]
    pub fn quota_for(&self, kind: ResourceKind) -> Quota {
        match kind {
            ResourceKind::Clients => self.max_clients,
            ResourceKind::Jobs => self.max_jobs,
            ResourceKind::Estimates => self.max_estimates,
            ResourceKind::Invoices => self.max_invoices,
            ResourceKind::Technicians => self.max_technicians,
            ResourceKind::Conversations => self.max_conversations,
            ResourceKind::PartnerOrganizations => self.max_partner_organizations,
        }
    }
}

/// Immutable tier-to-quotas table.
///
/// Constructed once at startup and passed to the services that need it,
/// so tests can run with alternate plan tables.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    free: PlanDefinition,
    pro: PlanDefinition,
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self {
            free: PlanDefinition::for_tier(PlanTier::Free),
            pro: PlanDefinition::for_tier(PlanTier::Pro),
        }
    }
}

impl PlanRegistry {
    /// Build a registry from explicit definitions.
    #[must_use]
    pub fn new(free: PlanDefinition, pro: PlanDefinition) -> Self {
        Self { free, pro }
    }

    /// The definition for a tier.
    #[must_use]
    pub fn definition(&self, tier: PlanTier) -> &PlanDefinition {
        match tier {
            PlanTier::Free => &self.free,
            PlanTier::Pro => &self.pro,
        }
    }

    /// The quota for a tier and resource kind.
    #[must_use]
    pub fn quota_for(&self, tier: PlanTier, kind: ResourceKind) -> Quota {
        self.definition(tier).quota_for(kind)
    }
}
