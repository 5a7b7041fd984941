use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use nba_matchup::analysis::gemini::GeminiClient;
use nba_matchup::analysis::personas::default_personas;
use nba_matchup::analysis::AnalysisOrchestrator;
use nba_matchup::api::{self, ApiState};
use nba_matchup::cache::refresher::CacheRefresher;
use nba_matchup::cache::PlayTypeCache;
use nba_matchup::config::{AppConfig, Cli};
use nba_matchup::monitoring::logger;
use nba_matchup::stats::nba::NbaStatsFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, secrets) = AppConfig::load(&cli.config)?;
    config.apply_cli(&cli);

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        addr = %config.server.addr(),
        ttl_seconds = config.cache.ttl_seconds,
        offensive_types = config.stats.offense.len(),
        defensive_types = config.stats.defense.len(),
        model = %config.analysis.model,
        "NBA matchup service starting"
    );

    if secrets.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; /api/ai-analysis will fail until it is configured");
    }

    let fetcher = Arc::new(NbaStatsFetcher::new(&config.stats)?);
    let refresher = Arc::new(CacheRefresher::new(
        PlayTypeCache::new(),
        fetcher,
        &config.stats,
        &config.cache,
    ));

    if cli.skip_initial_refresh {
        tracing::info!("Skipping initial cache load; first request will trigger it");
    } else {
        let summary = refresher.refresh().await;
        if !summary.failed.is_empty() {
            tracing::warn!(failed = ?summary.failed, "Initial cache load incomplete");
        }
    }

    let gemini = Arc::new(GeminiClient::new(&config.analysis, secrets.gemini_api_key)?);
    let orchestrator =
        AnalysisOrchestrator::from_config(gemini, default_personas(), &config.analysis);

    let state = ApiState::new(refresher, orchestrator);
    api::serve(state, &config.server.addr()).await?;

    tracing::info!("NBA matchup service stopped");
    Ok(())
}
