//! In-memory play-type cache.
//!
//! The cache holds one immutable [`CacheSnapshot`] behind an `Arc`. Readers
//! clone the `Arc` and work on that snapshot; a refresh builds a complete new
//! snapshot off to the side and swaps the pointer. A reader therefore sees
//! either the old tables or the new ones, never a mix.

pub mod refresher;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::stats::{DefenseRow, OffenseRow, PlayTypeTable};

#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub offense: Vec<PlayTypeTable<OffenseRow>>,
    pub defense: Vec<PlayTypeTable<DefenseRow>>,
    /// Completion instant of the refresh that produced this snapshot.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// Stale when never refreshed, or when strictly more than `ttl` has passed.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => match (now - at).to_std() {
                Ok(elapsed) => elapsed > ttl,
                // Refresh stamped in the future (clock step); treat as fresh.
                Err(_) => false,
            },
        }
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.refreshed_at
            .map(|at| ((now - at).num_milliseconds() as f64 / 1000.0).max(0.0))
    }
}

/// Cache status as reported by `/api/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub cached: bool,
    pub age_seconds: Option<f64>,
    pub offensive_types: usize,
    pub defensive_types: usize,
}

/// Shared handle to the current snapshot. Cloning shares the same cache.
#[derive(Clone, Default)]
pub struct PlayTypeCache {
    inner: Arc<RwLock<Arc<CacheSnapshot>>>,
}

impl PlayTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Holds the lock only long enough to clone the `Arc`.
    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.inner.read().await.clone()
    }

    /// Replace the whole snapshot in one step.
    pub async fn install(&self, snapshot: CacheSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.inner.write().await = snapshot;
    }

    pub async fn status(&self) -> CacheStatus {
        let snapshot = self.snapshot().await;
        CacheStatus {
            cached: snapshot.refreshed_at.is_some(),
            age_seconds: snapshot.age_seconds(Utc::now()),
            offensive_types: snapshot.offense.len(),
            defensive_types: snapshot.defense.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(play_type: &str) -> PlayTypeTable<OffenseRow> {
        PlayTypeTable::new(
            play_type,
            vec![OffenseRow {
                player: "Test Player".to_string(),
                team: "TST".to_string(),
                pts: 1.0,
            }],
        )
    }

    #[test]
    fn test_never_refreshed_is_stale() {
        let snapshot = CacheSnapshot::default();
        assert!(snapshot.is_stale(Duration::from_secs(3600), Utc::now()));
        assert!(snapshot.is_stale(Duration::MAX, Utc::now()));
    }

    #[test]
    fn test_staleness_boundary() {
        let now = Utc::now();
        let ttl = Duration::from_secs(60);
        let at = |secs: i64| CacheSnapshot {
            refreshed_at: Some(now - chrono::Duration::seconds(secs)),
            ..Default::default()
        };
        assert!(!at(0).is_stale(ttl, now));
        assert!(!at(59).is_stale(ttl, now));
        assert!(!at(60).is_stale(ttl, now));
        assert!(at(61).is_stale(ttl, now));
        assert!(at(100_000).is_stale(ttl, now));
    }

    #[test]
    fn test_future_stamp_is_fresh() {
        let now = Utc::now();
        let snapshot = CacheSnapshot {
            refreshed_at: Some(now + chrono::Duration::seconds(30)),
            ..Default::default()
        };
        assert!(!snapshot.is_stale(Duration::from_secs(1), now));
        assert_eq!(snapshot.age_seconds(now), Some(0.0));
    }

    #[tokio::test]
    async fn test_status_before_and_after_install() {
        let cache = PlayTypeCache::new();
        let before = cache.status().await;
        assert!(!before.cached);
        assert_eq!(before.age_seconds, None);
        assert_eq!(before.offensive_types, 0);

        cache
            .install(CacheSnapshot {
                offense: vec![table("Isolation"), table("Cut")],
                defense: vec![],
                refreshed_at: Some(Utc::now()),
            })
            .await;

        let after = cache.status().await;
        assert!(after.cached);
        assert!(after.age_seconds.unwrap() >= 0.0);
        assert_eq!(after.offensive_types, 2);
        assert_eq!(after.defensive_types, 0);
    }

    #[tokio::test]
    async fn test_held_snapshot_survives_install() {
        let cache = PlayTypeCache::new();
        cache
            .install(CacheSnapshot {
                offense: vec![table("Isolation")],
                defense: vec![],
                refreshed_at: Some(Utc::now()),
            })
            .await;

        let held = cache.snapshot().await;
        cache
            .install(CacheSnapshot {
                offense: vec![table("Cut"), table("Transition")],
                defense: vec![],
                refreshed_at: Some(Utc::now()),
            })
            .await;

        assert_eq!(held.offense.len(), 1);
        assert_eq!(held.offense[0].play_type, "Isolation");
        assert_eq!(cache.snapshot().await.offense.len(), 2);
    }
}
