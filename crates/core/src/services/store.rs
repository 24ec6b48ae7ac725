//! Persistence port for restriction sets.
//!
//! Sets are stored as aggregates together with their child restrictions.
//! Quota restrictions carry a `version`; [`RestrictionStore::update_quota`]
//! only writes when the stored version still matches, so concurrent
//! reservations against the same quota never lose an update.

use crate::restrictions::{
    BlockRestriction, QuotaRestriction, RestrictionOwner, RestrictionSet, TimeRestriction,
};
use async_trait::async_trait;
use quotagate_common::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage backend for restriction sets.
#[async_trait]
pub trait RestrictionStore: Send + Sync {
    /// Insert a new set together with its children.
    async fn insert_set(&self, set: RestrictionSet) -> AppResult<()>;

    /// Get a set with all of its children.
    async fn find_set(&self, id: &str) -> AppResult<Option<RestrictionSet>>;

    /// List the sets of an owner, oldest first.
    async fn find_sets_by_owner(&self, owner: &RestrictionOwner) -> AppResult<Vec<RestrictionSet>>;

    /// Delete a set and every restriction in it.
    async fn delete_set(&self, id: &str) -> AppResult<()>;

    /// Add a block restriction to its set.
    async fn insert_block(&self, block: BlockRestriction) -> AppResult<()>;

    /// Add a quota restriction to its set.
    async fn insert_quota(&self, quota: QuotaRestriction) -> AppResult<()>;

    /// Add a time restriction to its set.
    async fn insert_time(&self, time: TimeRestriction) -> AppResult<()>;

    async fn find_block(&self, id: &str) -> AppResult<Option<BlockRestriction>>;

    async fn find_quota(&self, id: &str) -> AppResult<Option<QuotaRestriction>>;

    async fn find_time(&self, id: &str) -> AppResult<Option<TimeRestriction>>;

    /// Replace a quota restriction if its stored version is `expected_version`.
    ///
    /// Returns the stored row with its version bumped, or
    /// [`AppError::Conflict`] when another writer got there first.
    async fn update_quota(
        &self,
        quota: QuotaRestriction,
        expected_version: u64,
    ) -> AppResult<QuotaRestriction>;

    /// Replace a time restriction.
    async fn update_time(&self, time: TimeRestriction) -> AppResult<TimeRestriction>;

    /// Delete a child restriction of any kind.
    async fn delete_restriction(&self, id: &str) -> AppResult<()>;
}

/// Process-local store backed by a map.
#[derive(Clone, Default)]
pub struct InMemoryRestrictionStore {
    sets: Arc<RwLock<HashMap<String, RestrictionSet>>>,
}

impl InMemoryRestrictionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn set_not_found(id: &str) -> AppError {
    AppError::RestrictionSetNotFound(id.to_string())
}

fn restriction_not_found(id: &str) -> AppError {
    AppError::RestrictionNotFound(id.to_string())
}

#[async_trait]
impl RestrictionStore for InMemoryRestrictionStore {
    async fn insert_set(&self, set: RestrictionSet) -> AppResult<()> {
        let mut sets = self.sets.write().await;
        if sets.contains_key(&set.id) {
            return Err(AppError::Conflict(format!(
                "Restriction set already exists: {}",
                set.id
            )));
        }
        sets.insert(set.id.clone(), set);
        Ok(())
    }

    async fn find_set(&self, id: &str) -> AppResult<Option<RestrictionSet>> {
        Ok(self.sets.read().await.get(id).cloned())
    }

    async fn find_sets_by_owner(&self, owner: &RestrictionOwner) -> AppResult<Vec<RestrictionSet>> {
        let mut found: Vec<_> = self
            .sets
            .read()
            .await
            .values()
            .filter(|set| set.owner == *owner)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn delete_set(&self, id: &str) -> AppResult<()> {
        self.sets
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| set_not_found(id))
    }

    async fn insert_block(&self, block: BlockRestriction) -> AppResult<()> {
        let mut sets = self.sets.write().await;
        let set = sets
            .get_mut(&block.restriction_set_id)
            .ok_or_else(|| set_not_found(&block.restriction_set_id))?;
        set.blocks.push(block);
        Ok(())
    }

    async fn insert_quota(&self, quota: QuotaRestriction) -> AppResult<()> {
        let mut sets = self.sets.write().await;
        let set = sets
            .get_mut(&quota.restriction_set_id)
            .ok_or_else(|| set_not_found(&quota.restriction_set_id))?;
        set.quotas.push(quota);
        Ok(())
    }

    async fn insert_time(&self, time: TimeRestriction) -> AppResult<()> {
        let mut sets = self.sets.write().await;
        let set = sets
            .get_mut(&time.restriction_set_id)
            .ok_or_else(|| set_not_found(&time.restriction_set_id))?;
        set.times.push(time);
        Ok(())
    }

    async fn find_block(&self, id: &str) -> AppResult<Option<BlockRestriction>> {
        Ok(self
            .sets
            .read()
            .await
            .values()
            .find_map(|set| set.block(id).cloned()))
    }

    async fn find_quota(&self, id: &str) -> AppResult<Option<QuotaRestriction>> {
        Ok(self
            .sets
            .read()
            .await
            .values()
            .find_map(|set| set.quota(id).cloned()))
    }

    async fn find_time(&self, id: &str) -> AppResult<Option<TimeRestriction>> {
        Ok(self
            .sets
            .read()
            .await
            .values()
            .find_map(|set| set.time(id).cloned()))
    }

    async fn update_quota(
        &self,
        mut quota: QuotaRestriction,
        expected_version: u64,
    ) -> AppResult<QuotaRestriction> {
        let mut sets = self.sets.write().await;
        let stored = sets
            .get_mut(&quota.restriction_set_id)
            .and_then(|set| set.quota_mut(&quota.id))
            .ok_or_else(|| restriction_not_found(&quota.id))?;

        if stored.version != expected_version {
            return Err(AppError::Conflict(format!(
                "Quota restriction {} was modified concurrently",
                quota.id
            )));
        }

        quota.version = expected_version + 1;
        *stored = quota.clone();
        Ok(quota)
    }

    async fn update_time(&self, time: TimeRestriction) -> AppResult<TimeRestriction> {
        let mut sets = self.sets.write().await;
        let stored = sets
            .get_mut(&time.restriction_set_id)
            .and_then(|set| set.time_mut(&time.id))
            .ok_or_else(|| restriction_not_found(&time.id))?;
        *stored = time.clone();
        Ok(time)
    }

    async fn delete_restriction(&self, id: &str) -> AppResult<()> {
        let mut sets = self.sets.write().await;
        if sets.values_mut().any(|set| set.remove_child(id)) {
            Ok(())
        } else {
            Err(restriction_not_found(id))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::restrictions::RestrictionTarget;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn set(id: &str, owner: RestrictionOwner) -> RestrictionSet {
        RestrictionSet::new(id.to_string(), owner, false, Utc::now())
    }

    fn quota(id: &str, set_id: &str) -> QuotaRestriction {
        QuotaRestriction {
            id: id.to_string(),
            restriction_set_id: set_id.to_string(),
            quota: Decimal::from(10),
            counter: Decimal::ZERO,
            target: RestrictionTarget::All,
            reset_strategy: "1d".to_string(),
            timezone: "UTC".to_string(),
            last_reset: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            reset_anchor: None,
            end_time: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_set_lifecycle() {
        let store = InMemoryRestrictionStore::new();
        let owner = RestrictionOwner::Account("acct".to_string());
        store.insert_set(set("s1", owner.clone())).await.unwrap();
        store.insert_set(set("s2", owner.clone())).await.unwrap();
        store
            .insert_set(set("s3", RestrictionOwner::Room("r".to_string())))
            .await
            .unwrap();

        assert!(matches!(
            store.insert_set(set("s1", owner.clone())).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.find_sets_by_owner(&owner).await.unwrap().len(), 2);

        store.insert_quota(quota("q1", "s1")).await.unwrap();
        store.delete_set("s1").await.unwrap();
        assert!(store.find_set("s1").await.unwrap().is_none());
        assert!(store.find_quota("q1").await.unwrap().is_none());
        assert!(matches!(
            store.delete_set("s1").await,
            Err(AppError::RestrictionSetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_child_requires_set() {
        let store = InMemoryRestrictionStore::new();
        assert!(matches!(
            store.insert_quota(quota("q1", "missing")).await,
            Err(AppError::RestrictionSetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_versioned_quota_update() {
        let store = InMemoryRestrictionStore::new();
        store
            .insert_set(set("s1", RestrictionOwner::Room("r".to_string())))
            .await
            .unwrap();
        store.insert_quota(quota("q1", "s1")).await.unwrap();

        let mut first = store.find_quota("q1").await.unwrap().unwrap();
        let mut second = first.clone();

        first.counter = Decimal::from(3);
        let written = store.update_quota(first, 0).await.unwrap();
        assert_eq!(written.version, 1);

        second.counter = Decimal::from(7);
        assert!(matches!(
            store.update_quota(second, 0).await,
            Err(AppError::Conflict(_))
        ));

        let stored = store.find_quota("q1").await.unwrap().unwrap();
        assert_eq!(stored.counter, Decimal::from(3));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_delete_restriction() {
        let store = InMemoryRestrictionStore::new();
        store
            .insert_set(set("s1", RestrictionOwner::Room("r".to_string())))
            .await
            .unwrap();
        store.insert_quota(quota("q1", "s1")).await.unwrap();

        store.delete_restriction("q1").await.unwrap();
        assert!(store.find_quota("q1").await.unwrap().is_none());
        assert!(matches!(
            store.delete_restriction("q1").await,
            Err(AppError::RestrictionNotFound(_))
        ));
    }
}
