//! Restriction service.
//!
//! Manages restriction sets on behalf of their owners and runs the quota
//! reservation protocol against a [`RestrictionStore`]. Quota writes are
//! compare-and-swap on the restriction's version and retried a bounded
//! number of times on conflict.

use super::store::RestrictionStore;
use crate::generate_id;
use crate::restrictions::{
    AccessDecision, ActorContext, BlockRestriction, PeriodStrategy, QuotaReservation,
    QuotaRestriction, QuotaStatus, ReleaseOutcome, ReserveOutcome, RestrictionOwner, RestrictionSet,
    RestrictionTarget, TimeRestriction, WindowError, local_now, parse_timezone,
};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use quotagate_common::{AppError, AppResult, Metrics, RestrictionConfig, get_metrics};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Input for creating a restriction set. Exactly one owner must be given.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSetInput {
    #[validate(length(min = 1, max = 64))]
    pub account_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub room_id: Option<String>,
}

/// Input for adding a block restriction.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockInput {
    pub restriction_set_id: String,
    pub target: RestrictionTarget,
}

/// Input for adding a quota restriction.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuotaInput {
    pub restriction_set_id: String,
    pub quota: Decimal,
    pub target: RestrictionTarget,
    #[validate(length(min = 2, max = 16))]
    pub reset_strategy: String,
    /// Defaults to the configured timezone.
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
    /// Defaults to the start of the current local day.
    pub last_reset: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// Input for adding a time restriction.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeInput {
    pub restriction_set_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub target: RestrictionTarget,
    #[validate(length(max = 16))]
    pub repeat_strategy: Option<String>,
    /// Defaults to the configured timezone.
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
}

/// Partial update of a quota restriction. Changing `quota` keeps the counter.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuotaPatch {
    pub quota: Option<Decimal>,
    pub target: Option<RestrictionTarget>,
    #[validate(length(min = 2, max = 16))]
    pub reset_strategy: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
    pub last_reset: Option<NaiveDateTime>,
    /// `Some(None)` removes the expiry.
    pub end_time: Option<Option<NaiveDateTime>>,
}

/// Partial update of a time restriction.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TimePatch {
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub target: Option<RestrictionTarget>,
    /// `Some(None)` makes the restriction one-off.
    pub repeat_strategy: Option<Option<String>>,
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
}

/// Service for restriction sets and quota accounting.
#[derive(Clone)]
pub struct RestrictionService {
    store: Arc<dyn RestrictionStore>,
    config: RestrictionConfig,
    metrics: Arc<Metrics>,
}

impl RestrictionService {
    /// Create a new restriction service reporting to the global metrics.
    #[must_use]
    pub fn new(store: Arc<dyn RestrictionStore>, config: RestrictionConfig) -> Self {
        Self {
            store,
            config,
            metrics: get_metrics().clone(),
        }
    }

    /// Report to `metrics` instead of the global collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    // ==================== Sets ====================

    /// Create a self-service restriction set owned by the actor or the actor's room.
    pub async fn create_set(
        &self,
        actor: &ActorContext,
        input: CreateSetInput,
    ) -> AppResult<RestrictionSet> {
        input.validate()?;

        let owner = RestrictionOwner::from_parts(input.account_id, input.room_id).ok_or_else(
            || AppError::Validation("Exactly one of accountId and roomId is required".to_string()),
        )?;
        if !owner.is_managed_by(actor) {
            return Err(AppError::Forbidden(
                "Not allowed to manage restrictions for this owner".to_string(),
            ));
        }

        self.insert_set(owner, false).await
    }

    /// Create a platform-managed set. Self-service calls cannot change it afterwards.
    pub async fn create_administrated_set(
        &self,
        owner: RestrictionOwner,
    ) -> AppResult<RestrictionSet> {
        self.insert_set(owner, true).await
    }

    async fn insert_set(
        &self,
        owner: RestrictionOwner,
        administrated: bool,
    ) -> AppResult<RestrictionSet> {
        let set = RestrictionSet::new(generate_id(), owner, administrated, Utc::now());
        self.store.insert_set(set.clone()).await?;
        info!(id = %set.id, owner = ?set.owner, administrated, "Restriction set created");
        Ok(set)
    }

    /// Get a set the actor may see.
    pub async fn get_set(&self, actor: &ActorContext, set_id: &str) -> AppResult<RestrictionSet> {
        let set = self.load_set(set_id).await?;
        Self::ensure_manager(actor, &set)?;
        Ok(set)
    }

    /// List the actor's own sets, or the sets of `room_id` when given.
    pub async fn list_sets(
        &self,
        actor: &ActorContext,
        room_id: Option<&str>,
    ) -> AppResult<Vec<RestrictionSet>> {
        let owner = match room_id {
            Some(room) => RestrictionOwner::Room(room.to_string()),
            None => RestrictionOwner::Account(actor.account_id.clone()),
        };
        if !owner.is_managed_by(actor) {
            return Err(AppError::Forbidden(
                "Not allowed to view restrictions of this room".to_string(),
            ));
        }
        self.store.find_sets_by_owner(&owner).await
    }

    /// Delete a set and all of its restrictions.
    pub async fn delete_set(&self, actor: &ActorContext, set_id: &str) -> AppResult<()> {
        let set = self.load_set(set_id).await?;
        Self::ensure_editable(actor, &set)?;
        self.store.delete_set(set_id).await?;
        info!(id = %set_id, "Restriction set deleted");
        Ok(())
    }

    // ==================== Block restrictions ====================

    pub async fn add_block(
        &self,
        actor: &ActorContext,
        input: CreateBlockInput,
    ) -> AppResult<BlockRestriction> {
        let set = self.load_set(&input.restriction_set_id).await?;
        Self::ensure_editable(actor, &set)?;

        let block = BlockRestriction {
            id: generate_id(),
            restriction_set_id: set.id,
            target: input.target,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.store.insert_block(block.clone()).await?;
        Ok(block)
    }

    pub async fn remove_block(&self, actor: &ActorContext, block_id: &str) -> AppResult<()> {
        let block = self
            .store
            .find_block(block_id)
            .await?
            .ok_or_else(|| AppError::RestrictionNotFound(block_id.to_string()))?;
        self.remove_child(actor, &block.restriction_set_id, block_id)
            .await
    }

    pub async fn list_blocks(
        &self,
        actor: &ActorContext,
        set_id: &str,
    ) -> AppResult<Vec<BlockRestriction>> {
        Ok(self.get_set(actor, set_id).await?.blocks)
    }

    // ==================== Quota restrictions ====================

    pub async fn add_quota(
        &self,
        actor: &ActorContext,
        input: CreateQuotaInput,
    ) -> AppResult<QuotaRestriction> {
        input.validate()?;
        let set = self.load_set(&input.restriction_set_id).await?;
        Self::ensure_editable(actor, &set)?;

        let timezone = input
            .timezone
            .unwrap_or_else(|| self.config.default_timezone.clone());
        let tz = parse_timezone(&timezone).map_err(invalid_input)?;
        let last_reset = input
            .last_reset
            .unwrap_or_else(|| local_now(tz, Utc::now()).date().and_time(NaiveTime::MIN));

        let quota = QuotaRestriction {
            id: generate_id(),
            restriction_set_id: set.id,
            quota: input.quota,
            counter: Decimal::ZERO,
            target: input.target,
            reset_strategy: input.reset_strategy,
            timezone,
            last_reset,
            reset_anchor: None,
            end_time: input.end_time,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        };
        validate_quota(&quota)?;

        self.store.insert_quota(quota.clone()).await?;
        Ok(quota)
    }

    pub async fn patch_quota(
        &self,
        actor: &ActorContext,
        quota_id: &str,
        patch: QuotaPatch,
    ) -> AppResult<QuotaRestriction> {
        patch.validate()?;
        let current = self.load_quota(quota_id).await?;
        let set = self.load_set(&current.restriction_set_id).await?;
        Self::ensure_editable(actor, &set)?;

        let now = Utc::now();
        self.modify_quota(quota_id, |quota| {
            if let Some(value) = patch.quota {
                quota.quota = value;
            }
            if let Some(target) = patch.target {
                quota.target = target;
            }
            if let Some(strategy) = &patch.reset_strategy {
                quota.reset_strategy.clone_from(strategy);
            }
            if let Some(timezone) = &patch.timezone {
                quota.timezone.clone_from(timezone);
            }
            if let Some(last_reset) = patch.last_reset {
                quota.last_reset = last_reset;
                quota.reset_anchor = None;
            }
            if let Some(end_time) = patch.end_time {
                quota.end_time = end_time;
            }
            quota.updated_at = Some(now);
            validate_quota(quota)
        })
        .await?;

        self.load_quota(quota_id).await
    }

    pub async fn remove_quota(&self, actor: &ActorContext, quota_id: &str) -> AppResult<()> {
        let quota = self.load_quota(quota_id).await?;
        self.remove_child(actor, &quota.restriction_set_id, quota_id)
            .await
    }

    pub async fn list_quotas(
        &self,
        actor: &ActorContext,
        set_id: &str,
    ) -> AppResult<Vec<QuotaRestriction>> {
        Ok(self.get_set(actor, set_id).await?.quotas)
    }

    // ==================== Time restrictions ====================

    pub async fn add_time(
        &self,
        actor: &ActorContext,
        input: CreateTimeInput,
    ) -> AppResult<TimeRestriction> {
        input.validate()?;
        let set = self.load_set(&input.restriction_set_id).await?;
        Self::ensure_editable(actor, &set)?;

        let time = TimeRestriction {
            id: generate_id(),
            restriction_set_id: set.id,
            start_time: input.start_time,
            end_time: input.end_time,
            target: input.target,
            repeat_strategy: input.repeat_strategy,
            timezone: input
                .timezone
                .unwrap_or_else(|| self.config.default_timezone.clone()),
            created_at: Utc::now(),
            updated_at: None,
        };
        validate_time(&time)?;

        self.store.insert_time(time.clone()).await?;
        Ok(time)
    }

    pub async fn patch_time(
        &self,
        actor: &ActorContext,
        time_id: &str,
        patch: TimePatch,
    ) -> AppResult<TimeRestriction> {
        patch.validate()?;
        let mut time = self
            .store
            .find_time(time_id)
            .await?
            .ok_or_else(|| AppError::RestrictionNotFound(time_id.to_string()))?;
        let set = self.load_set(&time.restriction_set_id).await?;
        Self::ensure_editable(actor, &set)?;

        if let Some(start_time) = patch.start_time {
            time.start_time = start_time;
        }
        if let Some(end_time) = patch.end_time {
            time.end_time = end_time;
        }
        if let Some(target) = patch.target {
            time.target = target;
        }
        if let Some(repeat_strategy) = patch.repeat_strategy {
            time.repeat_strategy = repeat_strategy;
        }
        if let Some(timezone) = patch.timezone {
            time.timezone = timezone;
        }
        time.updated_at = Some(Utc::now());
        validate_time(&time)?;

        self.store.update_time(time).await
    }

    pub async fn remove_time(&self, actor: &ActorContext, time_id: &str) -> AppResult<()> {
        let time = self
            .store
            .find_time(time_id)
            .await?
            .ok_or_else(|| AppError::RestrictionNotFound(time_id.to_string()))?;
        self.remove_child(actor, &time.restriction_set_id, time_id)
            .await
    }

    pub async fn list_times(
        &self,
        actor: &ActorContext,
        set_id: &str,
    ) -> AppResult<Vec<TimeRestriction>> {
        Ok(self.get_set(actor, set_id).await?.times)
    }

    // ==================== Evaluation ====================

    /// Evaluate a quota for an actor without consuming anything.
    pub async fn quota_status(
        &self,
        actor: &ActorContext,
        quota_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaStatus> {
        let quota = self.load_quota(quota_id).await?;
        Ok(quota.evaluate_status(actor, now)?)
    }

    /// Evaluate a whole set for an actor.
    pub async fn check_access(
        &self,
        actor: &ActorContext,
        set_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<AccessDecision> {
        let set = self.load_set(set_id).await?;
        Ok(set.check_access(actor, now)?)
    }

    /// Lease between `min_amount` and `max_amount` from a quota and persist the result.
    pub async fn reserve_quota(
        &self,
        actor: &ActorContext,
        quota_id: &str,
        min_amount: Decimal,
        max_amount: Decimal,
        now: DateTime<Utc>,
    ) -> AppResult<ReserveOutcome> {
        let minimum_lease = Decimal::from(self.config.minimum_lease);
        let (outcome, rolled_over) = self
            .modify_quota(quota_id, |quota| {
                let previous = quota.last_reset;
                let outcome = quota.reserve_quota_with_floor(
                    actor,
                    min_amount,
                    max_amount,
                    minimum_lease,
                    now,
                )?;
                Ok((outcome, quota.last_reset != previous))
            })
            .await?;

        if rolled_over {
            self.metrics.record_rollover();
        }
        match &outcome {
            ReserveOutcome::Reserved(reservation) => {
                let units = reservation.reserved.ceil().to_u64().unwrap_or_default();
                self.metrics.record_granted(units);
            }
            ReserveOutcome::Unrestricted => self.metrics.record_unrestricted(),
            ReserveOutcome::Denied(_) => self.metrics.record_denied(),
        }
        Ok(outcome)
    }

    /// Reconcile a reservation with actual usage and persist the result.
    ///
    /// The null reservation needs no reconciliation and is accepted as is.
    pub async fn free_unused_quota(
        &self,
        reservation: &QuotaReservation,
        actually_used: Decimal,
    ) -> AppResult<ReleaseOutcome> {
        let Some(quota_id) = reservation.quota_restriction_id.as_deref() else {
            return Ok(ReleaseOutcome::Applied);
        };

        let outcome = self
            .modify_quota(quota_id, |quota| Ok(quota.release(reservation, actually_used)))
            .await?;

        self.metrics
            .record_release(outcome.is_accepted(), outcome == ReleaseOutcome::Stale);
        if !outcome.is_accepted() {
            warn!(quota_id, "Reservation presented to the wrong quota restriction");
        }
        Ok(outcome)
    }

    // ==================== Helpers ====================

    /// Load a quota, apply `apply` and write it back if it changed.
    ///
    /// On a version conflict the whole read-modify-write is retried up to
    /// `max_reservation_retries` times, so `apply` must be repeatable.
    async fn modify_quota<T, F>(&self, quota_id: &str, mut apply: F) -> AppResult<T>
    where
        F: FnMut(&mut QuotaRestriction) -> AppResult<T> + Send,
        T: Send,
    {
        let mut retries = 0;
        loop {
            let original = self.load_quota(quota_id).await?;
            let mut quota = original.clone();
            let result = apply(&mut quota)?;

            if quota == original {
                return Ok(result);
            }

            match self.store.update_quota(quota, original.version).await {
                Ok(_) => return Ok(result),
                Err(AppError::Conflict(message)) => {
                    self.metrics.record_write_conflict();
                    if retries >= self.config.max_reservation_retries {
                        return Err(AppError::Conflict(message));
                    }
                    retries += 1;
                    warn!(quota_id, retries, "Quota write conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn remove_child(&self, actor: &ActorContext, set_id: &str, id: &str) -> AppResult<()> {
        let set = self.load_set(set_id).await?;
        Self::ensure_editable(actor, &set)?;
        self.store.delete_restriction(id).await
    }

    async fn load_set(&self, set_id: &str) -> AppResult<RestrictionSet> {
        self.store
            .find_set(set_id)
            .await?
            .ok_or_else(|| AppError::RestrictionSetNotFound(set_id.to_string()))
    }

    async fn load_quota(&self, quota_id: &str) -> AppResult<QuotaRestriction> {
        self.store
            .find_quota(quota_id)
            .await?
            .ok_or_else(|| AppError::RestrictionNotFound(quota_id.to_string()))
    }

    fn ensure_manager(actor: &ActorContext, set: &RestrictionSet) -> AppResult<()> {
        if set.owner.is_managed_by(actor) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not allowed to manage this restriction set".to_string(),
            ))
        }
    }

    fn ensure_editable(actor: &ActorContext, set: &RestrictionSet) -> AppResult<()> {
        Self::ensure_manager(actor, set)?;
        if set.administrated {
            return Err(AppError::Forbidden(
                "Restriction set is managed by the platform".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid_input(err: WindowError) -> AppError {
    AppError::Validation(err.to_string())
}

fn validate_quota(quota: &QuotaRestriction) -> AppResult<()> {
    if quota.quota < Decimal::ZERO {
        return Err(AppError::Validation("Quota must not be negative".to_string()));
    }
    quota.validate().map_err(invalid_input)
}

fn validate_time(time: &TimeRestriction) -> AppResult<()> {
    if time.end_time < time.start_time {
        return Err(AppError::Validation(
            "End time must not be before start time".to_string(),
        ));
    }
    parse_timezone(&time.timezone).map_err(invalid_input)?;
    if let Some(strategy) = time.repeat_strategy.as_deref().filter(|s| !s.trim().is_empty()) {
        strategy
            .parse::<PeriodStrategy>()
            .map_err(invalid_input)?;
    }
    Ok(())
}
