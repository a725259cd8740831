//! Short-lived caches for the priority and status lookup lists.
//!
//! Entries expire 60 seconds after insertion. Writes to the lookup tables
//! do not invalidate them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use moka::sync::Cache;

use super::db::DbHandle;
use super::models::{Priority, Status};

pub const LOOKUP_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct LookupCache {
    priorities: Cache<(), Arc<Vec<Priority>>>,
    statuses: Cache<(), Arc<Vec<Status>>>,
}

impl LookupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            priorities: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            statuses: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    /// Priorities ordered by magnitude, highest first.
    pub async fn priorities(&self, db: &DbHandle) -> Result<Arc<Vec<Priority>>> {
        if let Some(hit) = self.priorities.get(&()) {
            return Ok(hit);
        }
        let loaded = Arc::new(db.call(|db| db.list_priorities()).await?);
        self.priorities.insert((), loaded.clone());
        Ok(loaded)
    }

    pub async fn statuses(&self, db: &DbHandle) -> Result<Arc<Vec<Status>>> {
        if let Some(hit) = self.statuses.get(&()) {
            return Ok(hit);
        }
        let loaded = Arc::new(db.call(|db| db.list_statuses()).await?);
        self.statuses.insert((), loaded.clone());
        Ok(loaded)
    }

    pub fn clear(&self) {
        self.priorities.invalidate_all();
        self.statuses.invalidate_all();
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new(LOOKUP_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpdesk::db::HelpdeskDb;

    #[tokio::test]
    async fn test_cached_list_survives_writes_until_cleared() -> Result<()> {
        let handle = DbHandle::new(HelpdeskDb::new_in_memory()?);
        handle.call(|db| db.seed_defaults("a@example.com")).await?;
        let cache = LookupCache::default();

        let first = cache.priorities(&handle).await?;
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].name, "Critical");

        handle
            .call(|db| db.create_priority("Blocker", "#000000", 9).map(|_| ()))
            .await?;
        assert_eq!(cache.priorities(&handle).await?.len(), 3);

        cache.clear();
        assert_eq!(cache.priorities(&handle).await?.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_statuses_expire_after_ttl() -> Result<()> {
        let handle = DbHandle::new(HelpdeskDb::new_in_memory()?);
        handle.call(|db| db.seed_defaults("a@example.com")).await?;
        let cache = LookupCache::new(Duration::from_millis(20));
        assert_eq!(cache.statuses(&handle).await?.len(), 3);
        handle
            .call(|db| db.create_status("Waiting", "#123456").map(|_| ()))
            .await?;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.statuses(&handle).await?.len(), 4);
        Ok(())
    }
}
