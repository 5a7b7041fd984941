//! Cache refresher.
//!
//! Fetches every configured play type (offense first, then defense), keeps
//! whatever succeeded, and installs the result as one new snapshot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::cache::{CacheSnapshot, PlayTypeCache};
use crate::config::{CacheConfig, PlayTypeSource, StatsConfig};
use crate::stats::{PlayTypeTable, Side, StatsFetcher};

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub offensive_types: usize,
    pub defensive_types: usize,
    /// `"<side>:<play type>"` for each table that could not be fetched.
    pub failed: Vec<String>,
}

pub struct CacheRefresher {
    cache: PlayTypeCache,
    fetcher: Arc<dyn StatsFetcher>,
    offense: Vec<PlayTypeSource>,
    defense: Vec<PlayTypeSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    /// Held by `ensure_fresh` so concurrent callers on a stale cache share one refresh.
    stale_refresh: Mutex<()>,
}

impl CacheRefresher {
    pub fn new(
        cache: PlayTypeCache,
        fetcher: Arc<dyn StatsFetcher>,
        stats: &StatsConfig,
        config: &CacheConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            offense: stats.offense.clone(),
            defense: stats.defense.clone(),
            ttl: config.ttl(),
            fetch_timeout: config.fetch_timeout(),
            stale_refresh: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &PlayTypeCache {
        &self.cache
    }

    /// Refresh synchronously if the cache is empty or older than the TTL.
    /// Returns whether this call ran the refresh; callers that waited on
    /// another caller's refresh get `false`.
    pub async fn ensure_fresh(&self) -> bool {
        if !self.cache.snapshot().await.is_stale(self.ttl, Utc::now()) {
            return false;
        }

        let _guard = self.stale_refresh.lock().await;
        let snapshot = self.cache.snapshot().await;
        if !snapshot.is_stale(self.ttl, Utc::now()) {
            return false;
        }

        info!(
            age_seconds = ?snapshot.age_seconds(Utc::now()),
            ttl_seconds = self.ttl.as_secs(),
            "Cache stale, refreshing"
        );
        self.refresh().await;
        true
    }

    /// Fetch all configured play types and install the new snapshot.
    ///
    /// Individual failures are logged and the play type is left out. The
    /// snapshot is installed and stamped even when every fetch failed.
    #[instrument(skip(self), fields(source = self.fetcher.name()))]
    pub async fn refresh(&self) -> RefreshSummary {
        info!(
            offense = self.offense.len(),
            defense = self.defense.len(),
            "Starting cache refresh"
        );

        let mut failed = Vec::new();

        let mut offense = Vec::with_capacity(self.offense.len());
        for source in &self.offense {
            let fetched = self
                .fetch_with_timeout(self.fetcher.fetch_offense(&source.url, &source.play_type))
                .await;
            match collect(Side::Offense, source, fetched) {
                Some(table) => offense.push(table),
                None => failed.push(format!("{}:{}", Side::Offense, source.play_type)),
            }
        }

        let mut defense = Vec::with_capacity(self.defense.len());
        for source in &self.defense {
            let fetched = self
                .fetch_with_timeout(self.fetcher.fetch_defense(&source.url, &source.play_type))
                .await;
            match collect(Side::Defense, source, fetched) {
                Some(table) => defense.push(table),
                None => failed.push(format!("{}:{}", Side::Defense, source.play_type)),
            }
        }

        let summary = RefreshSummary {
            offensive_types: offense.len(),
            defensive_types: defense.len(),
            failed,
        };

        self.cache
            .install(CacheSnapshot {
                offense,
                defense,
                refreshed_at: Some(Utc::now()),
            })
            .await;

        info!(
            offensive_types = summary.offensive_types,
            defensive_types = summary.defensive_types,
            failed = summary.failed.len(),
            "Cache refresh complete"
        );

        summary
    }

    /// Run a refresh in the background. The handle may be awaited or dropped.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<RefreshSummary> {
        let refresher = Arc::clone(self);
        tokio::spawn(async move { refresher.refresh().await })
    }

    /// The timeout starts once the source is ready, so it bounds the request
    /// itself and not the wait behind other refreshes.
    async fn fetch_with_timeout<T>(
        &self,
        fetch: impl Future<Output = Result<Option<T>>>,
    ) -> Result<Option<T>> {
        self.fetcher.ready().await;
        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "fetch timed out after {}s",
                self.fetch_timeout.as_secs_f64()
            )),
        }
    }
}

fn collect<R>(
    side: Side,
    source: &PlayTypeSource,
    fetched: Result<Option<PlayTypeTable<R>>>,
) -> Option<PlayTypeTable<R>> {
    match fetched {
        Ok(Some(table)) => {
            info!(%side, play_type = %source.play_type, rows = table.rows.len(), "Cached play type");
            Some(table)
        }
        Ok(None) => {
            warn!(%side, play_type = %source.play_type, "No usable table, skipping play type");
            None
        }
        Err(e) => {
            warn!(%side, play_type = %source.play_type, error = %e, "Play type fetch failed");
            None
        }
    }
}
