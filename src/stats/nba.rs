//! NBA play-type stats source.
//!
//! Pulls synergy play-type result sets from stats.nba.com and turns them
//! into typed offensive (player) and defensive (team) tables.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::StatsConfig;
use crate::stats::{DefenseRow, OffenseRow, PlayTypeTable, StatsFetcher};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct NbaStatsFetcher {
    client: reqwest::Client,
    limiter: Arc<Limiter>,
}

impl NbaStatsFetcher {
    pub fn new(config: &StatsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(stats_headers())
            .build()
            .context("Failed to create stats HTTP client")?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self { client, limiter })
    }

    async fn fetch_result_set(&self, url: &str) -> Result<ResultSet> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("stats.nba.com request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("stats.nba.com returned {status}");
        }

        let body: StatsResponse = response
            .json()
            .await
            .context("Failed to parse stats.nba.com response")?;

        body.into_first_result_set()
            .context("stats.nba.com response has no result set")
    }
}

/// stats.nba.com rejects requests that do not look like they came from its own site.
fn stats_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        ),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.nba.com/"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://www.nba.com"));
    headers.insert("x-nba-stats-origin", HeaderValue::from_static("stats"));
    headers.insert("x-nba-stats-token", HeaderValue::from_static("true"));
    headers
}

#[async_trait]
impl StatsFetcher for NbaStatsFetcher {
    #[instrument(skip(self, url))]
    async fn fetch_offense(
        &self,
        url: &str,
        play_type: &str,
    ) -> Result<Option<PlayTypeTable<OffenseRow>>> {
        let set = self.fetch_result_set(url).await?;
        let table = parse_offense(play_type, &set);
        debug!(
            rows = table.as_ref().map_or(0, |t| t.rows.len()),
            "Parsed offensive table"
        );
        Ok(table)
    }

    #[instrument(skip(self, url))]
    async fn fetch_defense(
        &self,
        url: &str,
        play_type: &str,
    ) -> Result<Option<PlayTypeTable<DefenseRow>>> {
        let set = self.fetch_result_set(url).await?;
        let table = parse_defense(play_type, &set);
        debug!(
            rows = table.as_ref().map_or(0, |t| t.rows.len()),
            "Parsed defensive table"
        );
        Ok(table)
    }

    async fn ready(&self) {
        self.limiter.until_ready().await;
    }

    fn name(&self) -> &str {
        "stats_nba"
    }
}

// --- Parsing ---

/// Build an offensive table. Returns `None` when the player, team or points
/// columns are missing, or when no row names a player.
pub fn parse_offense(play_type: &str, set: &ResultSet) -> Option<PlayTypeTable<OffenseRow>> {
    let player_col = set.column("PLAYER_NAME")?;
    let team_col = set.column("TEAM_ABBREVIATION")?;
    let pts_col = set.column("PTS")?;

    let rows: Vec<OffenseRow> = set
        .row_set
        .iter()
        .filter_map(|row| {
            let player = cell_str(row.get(player_col)?);
            if player.is_empty() {
                return None;
            }
            Some(OffenseRow {
                player,
                team: row.get(team_col).map(cell_str).unwrap_or_default(),
                pts: row.get(pts_col).map(cell_f64).unwrap_or(0.0),
            })
        })
        .collect();

    (!rows.is_empty()).then(|| PlayTypeTable::new(play_type, rows))
}

/// Build a defensive table ranked by PPP allowed, lowest first.
pub fn parse_defense(play_type: &str, set: &ResultSet) -> Option<PlayTypeTable<DefenseRow>> {
    let team_col = set.column("TEAM_NAME")?;
    let ppp_col = set.column("PPP")?;

    let mut rows: Vec<(String, f64)> = set
        .row_set
        .iter()
        .filter_map(|row| {
            let team = cell_str(row.get(team_col)?);
            if team.is_empty() {
                return None;
            }
            Some((team, row.get(ppp_col).map(cell_f64).unwrap_or(0.0)))
        })
        .collect();

    if rows.is_empty() {
        return None;
    }

    rows.sort_by(|a, b| a.1.total_cmp(&b.1));

    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(i, (team, ppp))| DefenseRow {
            team,
            rank: i as u32 + 1,
            ppp,
        })
        .collect();

    Some(PlayTypeTable::new(play_type, rows))
}

/// Numeric cell; null, blank, unparseable and non-finite values count as zero.
fn cell_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn cell_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

// --- stats.nba.com Response Types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    result_sets: Vec<ResultSet>,
    /// Some endpoints return a single object under `resultSet` instead.
    result_set: Option<ResultSet>,
}

impl StatsResponse {
    fn into_first_result_set(self) -> Option<ResultSet> {
        self.result_sets.into_iter().next().or(self.result_set)
    }
}

/// A header/rows table as served by stats.nba.com.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub row_set: Vec<Vec<Value>>,
}

impl ResultSet {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }
}
