use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Billing tier of a user, provided by the billing collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Pro,
    Agency,
}

impl PlanTier {
    /// Maximum number of connected channels
    pub fn channel_limit(&self) -> u32 {
        match self {
            PlanTier::Free => 1,
            PlanTier::Starter => 3,
            PlanTier::Pro => 10,
            PlanTier::Agency => 50,
        }
    }

    /// Maximum number of videos with a container assigned
    pub fn video_limit(&self) -> u32 {
        match self {
            PlanTier::Free => 25,
            PlanTier::Starter => 250,
            PlanTier::Pro => 2_500,
            PlanTier::Agency => 25_000,
        }
    }

    pub fn limit_for(&self, resource: LimitedResource) -> u32 {
        match resource {
            LimitedResource::Channels => self.channel_limit(),
            LimitedResource::Videos => self.video_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LimitedResource {
    Channels,
    Videos,
}

/// Result of comparing a user's current usage against their tier ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitCheck {
    pub allowed: bool,
    pub limit: u32,
    pub current: u32,
    pub current_tier: PlanTier,
}
