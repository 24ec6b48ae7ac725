//! Restriction sets and the combined access check.

use super::actor::ActorContext;
use super::block::{BlockRestriction, any_blocking};
use super::quota::{QuotaRestriction, QuotaStatus};
use super::time::TimeRestriction;
use super::window::WindowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a restriction set belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RestrictionOwner {
    Account(String),
    Room(String),
}

impl RestrictionOwner {
    /// Build an owner from optional account and room ids; exactly one must be set.
    #[must_use]
    pub fn from_parts(account_id: Option<String>, room_id: Option<String>) -> Option<Self> {
        match (account_id, room_id) {
            (Some(account), None) => Some(Self::Account(account)),
            (None, Some(room)) => Some(Self::Room(room)),
            _ => None,
        }
    }

    /// Whether the actor may manage sets with this owner.
    ///
    /// Room owners require a moderating role resolved for that same room.
    #[must_use]
    pub fn is_managed_by(&self, actor: &ActorContext) -> bool {
        match self {
            Self::Account(account_id) => *account_id == actor.account_id,
            Self::Room(room_id) => actor.moderates(room_id),
        }
    }
}

/// Owner-scoped container of block, quota and time restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionSet {
    pub id: String,
    pub owner: RestrictionOwner,
    /// Platform-managed; not editable through self-service.
    pub administrated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocks: Vec<BlockRestriction>,
    #[serde(default)]
    pub quotas: Vec<QuotaRestriction>,
    #[serde(default)]
    pub times: Vec<TimeRestriction>,
}

/// Status of one quota restriction inside an [`AccessDecision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub quota_restriction_id: String,
    pub status: QuotaStatus,
}

/// Combined verdict of a restriction set for one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub blocked: bool,
    pub outside_time: bool,
    pub quotas: Vec<QuotaCheck>,
}

impl AccessDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !self.blocked
            && !self.outside_time
            && !self.quotas.iter().any(|check| check.status.blocks_access())
    }
}

impl RestrictionSet {
    /// A new, empty set.
    #[must_use]
    pub fn new(id: String, owner: RestrictionOwner, administrated: bool, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            administrated,
            created_at: now,
            updated_at: None,
            blocks: Vec::new(),
            quotas: Vec::new(),
            times: Vec::new(),
        }
    }

    /// Evaluate every restriction in the set without changing any of them.
    pub fn check_access(
        &self,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, WindowError> {
        let blocked = any_blocking(&self.blocks, actor);
        let outside_time = self
            .times
            .iter()
            .any(|time| !time.evaluate(actor, now).permits_access());
        let quotas = self
            .quotas
            .iter()
            .map(|quota| -> Result<QuotaCheck, WindowError> {
                Ok(QuotaCheck {
                    quota_restriction_id: quota.id.clone(),
                    status: quota.evaluate_status(actor, now)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AccessDecision {
            blocked,
            outside_time,
            quotas,
        })
    }

    #[must_use]
    pub fn block(&self, id: &str) -> Option<&BlockRestriction> {
        self.blocks.iter().find(|block| block.id == id)
    }

    #[must_use]
    pub fn quota(&self, id: &str) -> Option<&QuotaRestriction> {
        self.quotas.iter().find(|quota| quota.id == id)
    }

    pub fn quota_mut(&mut self, id: &str) -> Option<&mut QuotaRestriction> {
        self.quotas.iter_mut().find(|quota| quota.id == id)
    }

    #[must_use]
    pub fn time(&self, id: &str) -> Option<&TimeRestriction> {
        self.times.iter().find(|time| time.id == id)
    }

    pub fn time_mut(&mut self, id: &str) -> Option<&mut TimeRestriction> {
        self.times.iter_mut().find(|time| time.id == id)
    }

    /// Remove a child restriction of any kind. Returns whether one was removed.
    pub fn remove_child(&mut self, id: &str) -> bool {
        let before = self.blocks.len() + self.quotas.len() + self.times.len();
        self.blocks.retain(|block| block.id != id);
        self.quotas.retain(|quota| quota.id != id);
        self.times.retain(|time| time.id != id);
        before != self.blocks.len() + self.quotas.len() + self.times.len()
    }
}
