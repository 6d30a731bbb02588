//! Per-user plan ceilings, enforced inside the write they guard

use std::sync::Arc;

use crate::db::{AssignOutcome, ChannelConnection, Database, InsertOutcome};
use crate::error::{Error, Result};
use crate::models::{LimitCheck, LimitedResource, PlanTier};

/// Source of a user's billing tier
pub trait TierLookup: Send + Sync {
    fn tier_for(&self, user_id: i64) -> Result<PlanTier>;
}

/// Reads tiers the billing collaborator writes into `user_plans`.
/// Users without a row are on the free tier.
pub struct DbTierLookup {
    db: Arc<Database>,
}

impl DbTierLookup {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl TierLookup for DbTierLookup {
    fn tier_for(&self, user_id: i64) -> Result<PlanTier> {
        Ok(self.db.get_user_plan(user_id)?.unwrap_or_default())
    }
}

/// Result of a guarded video assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The video now points at a different container than before
    Changed,
    Unchanged,
    Cleared,
}

pub struct PlanLimiter {
    db: Arc<Database>,
    tiers: Arc<dyn TierLookup>,
}

impl PlanLimiter {
    pub fn new(db: Arc<Database>, tiers: Arc<dyn TierLookup>) -> Self {
        Self { db, tiers }
    }

    pub fn check_channel_limit(&self, user_id: i64) -> Result<LimitCheck> {
        let current = self.db.count_channels_for_user(user_id)?;
        self.check(user_id, LimitedResource::Channels, current)
    }

    pub fn check_video_limit(&self, user_id: i64) -> Result<LimitCheck> {
        let current = self.db.count_assigned_videos_for_user(user_id)?;
        self.check(user_id, LimitedResource::Videos, current)
    }

    fn check(&self, user_id: i64, resource: LimitedResource, current: u32) -> Result<LimitCheck> {
        let tier = self.tiers.tier_for(user_id)?;
        let limit = tier.limit_for(resource);
        Ok(LimitCheck {
            allowed: current < limit,
            limit,
            current,
            current_tier: tier,
        })
    }

    fn limit_reached(resource: LimitedResource, tier: PlanTier, current: u32) -> Error {
        let limit = tier.limit_for(resource);
        log::info!(
            "[LIMITER] {} limit reached: {}/{} on {} tier",
            resource,
            current,
            limit,
            tier
        );
        Error::LimitReached {
            resource,
            limit,
            tier,
        }
    }

    /// Store a newly connected channel. Reconnecting a channel the user
    /// already owns replaces its credentials and never counts against the limit.
    pub fn connect_channel(&self, connection: &ChannelConnection) -> Result<i64> {
        let tier = self.tiers.tier_for(connection.user_id)?;
        match self
            .db
            .connect_channel_within_limit(connection, tier.channel_limit())?
        {
            InsertOutcome::Created(id) => {
                log::info!(
                    "[LIMITER] User {} connected channel {}",
                    connection.user_id,
                    connection.external_channel_id
                );
                Ok(id)
            }
            InsertOutcome::Reconnected(id) => {
                log::info!(
                    "[LIMITER] User {} reconnected channel {}",
                    connection.user_id,
                    connection.external_channel_id
                );
                Ok(id)
            }
            InsertOutcome::LimitReached { current } => {
                Err(Self::limit_reached(LimitedResource::Channels, tier, current))
            }
            InsertOutcome::OwnedByOtherUser => Err(Error::AccessDenied),
        }
    }

    /// Assign or clear a video's container. Only a previously unassigned video
    /// counts against the limit.
    pub fn assign_video(
        &self,
        user_id: i64,
        video_id: i64,
        container_id: Option<i64>,
    ) -> Result<Assignment> {
        let tier = self.tiers.tier_for(user_id)?;
        match self.db.assign_container_within_limit(
            video_id,
            user_id,
            container_id,
            tier.video_limit(),
        )? {
            AssignOutcome::Assigned => Ok(Assignment::Changed),
            AssignOutcome::Unchanged => Ok(Assignment::Unchanged),
            AssignOutcome::Unassigned => Ok(Assignment::Cleared),
            AssignOutcome::LimitReached { current } => {
                Err(Self::limit_reached(LimitedResource::Videos, tier, current))
            }
            AssignOutcome::VideoNotFound => Err(Error::NotFound(format!("video {}", video_id))),
        }
    }
}
