//! Multi-persona matchup analysis.
//!
//! Runs the persona pipeline sequentially against a [`TextGenerator`], each
//! call retried on rate limiting with a fixed pause, and stitches the
//! sections into one report. Nothing is kept between requests.

pub mod gemini;
pub mod personas;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::analysis::gemini::{GenerationError, TextGenerator};
use crate::analysis::personas::Persona;
use crate::config::AnalysisConfig;
use crate::error::{ApiError, ApiResult};

pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please wait a minute and try again.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatLine {
    pub play_type: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub pts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseStatLine {
    pub play_type: String,
    pub rank: u32,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub ppp: f64,
}

/// Metrics sent as `null` count as zero, like blank cells from the stats source.
fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite()).unwrap_or(0.0))
}

/// Body of `POST /api/ai-analysis` as sent by the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    pub player_name: Option<String>,
    pub team_name: Option<String>,
    #[serde(default)]
    pub player_stats: Vec<PlayerStatLine>,
    #[serde(default)]
    pub defense_stats: Vec<DefenseStatLine>,
}

impl AnalysisPayload {
    pub fn validate(self) -> ApiResult<AnalysisRequest> {
        let player_name = non_blank(self.player_name);
        let team_name = non_blank(self.team_name);
        match (player_name, team_name) {
            (Some(player_name), Some(team_name)) => Ok(AnalysisRequest {
                player_name,
                team_name,
                player_stats: self.player_stats,
                defense_stats: self.defense_stats,
            }),
            _ => Err(ApiError::BadRequest(
                "Missing player or team name".to_string(),
            )),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A validated analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub player_name: String,
    pub team_name: String,
    pub player_stats: Vec<PlayerStatLine>,
    pub defense_stats: Vec<DefenseStatLine>,
}

/// One persona's contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaSection {
    pub key: String,
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// All sections, labelled, in pipeline order.
    pub analysis: String,
    pub player: String,
    pub team: String,
    pub personas: Vec<PersonaSection>,
    /// Text of the last persona in the pipeline.
    pub final_recommendation: String,
    pub analysis_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    Idle,
    BuildingPrompts,
    AwaitingPersona(usize),
    Synthesizing,
    Complete,
    Failed,
}

pub struct AnalysisOrchestrator {
    generator: Arc<dyn TextGenerator>,
    personas: Vec<Persona>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        personas: Vec<Persona>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            generator,
            personas,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(
        generator: Arc<dyn TextGenerator>,
        personas: Vec<Persona>,
        config: &AnalysisConfig,
    ) -> Self {
        Self::new(generator, personas, config.max_attempts, config.retry_delay())
    }

    #[instrument(skip(self, request), fields(player = %request.player_name, team = %request.team_name))]
    pub async fn run(&self, request: AnalysisRequest) -> ApiResult<AnalysisReport> {
        let analysis_id = Uuid::new_v4();
        let mut stage = AnalysisStage::Idle;
        debug!(%analysis_id, ?stage, "Analysis requested");

        if self.personas.is_empty() {
            return Err(ApiError::Unexpected(
                "Analysis failed: no personas configured".to_string(),
            ));
        }

        stage = AnalysisStage::BuildingPrompts;
        debug!(%analysis_id, ?stage, "Building matchup context");
        let context = prompt::matchup_context(&request);

        info!(%analysis_id, personas = self.personas.len(), "Starting persona analysis");

        let last = self.personas.len() - 1;
        let mut sections: Vec<PersonaSection> = Vec::with_capacity(self.personas.len());

        for (index, persona) in self.personas.iter().enumerate() {
            stage = if index == last && persona.uses_prior_outputs {
                AnalysisStage::Synthesizing
            } else {
                AnalysisStage::AwaitingPersona(index)
            };
            debug!(%analysis_id, ?stage, persona = %persona.key, "Calling persona");

            let system = prompt::system_prompt(persona, &request);
            let user = prompt::user_prompt(persona, &request, &context, &sections);

            let text = match self.generate_with_retry(&system, &user).await {
                Ok(text) => text,
                Err(e) => {
                    stage = AnalysisStage::Failed;
                    warn!(%analysis_id, ?stage, persona = %persona.key, error = %e, "Analysis failed");
                    return Err(e);
                }
            };

            sections.push(PersonaSection {
                key: persona.key.clone(),
                label: persona.label.clone(),
                text: text.trim().to_string(),
            });
        }

        stage = AnalysisStage::Complete;
        info!(%analysis_id, ?stage, "Analysis complete");

        let final_recommendation = sections
            .last()
            .map(|s| s.text.clone())
            .unwrap_or_default();

        Ok(AnalysisReport {
            analysis: render_sections(&sections),
            player: request.player_name,
            team: request.team_name,
            personas: sections,
            final_recommendation,
            analysis_id,
        })
    }

    async fn generate_with_retry(&self, system: &str, user: &str) -> ApiResult<String> {
        with_rate_limit_retry(self.max_attempts, self.retry_delay, || {
            self.generator.generate(system, user)
        })
        .await
    }
}

/// Run `operation` up to `max_attempts` times, sleeping `delay` between
/// attempts. Only rate limiting is retried; any other failure returns at once.
pub async fn with_rate_limit_retry<F, Fut>(
    max_attempts: u32,
    delay: Duration,
    operation: F,
) -> ApiResult<String>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<String, GenerationError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(text) => return Ok(text),
            Err(GenerationError::RateLimited(reason)) => {
                if attempt >= max_attempts {
                    warn!(attempt, reason = %reason, "Rate limit retries exhausted");
                    return Err(ApiError::RateLimited(RATE_LIMIT_MESSAGE.to_string()));
                }

                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(GenerationError::Failed(e)) => {
                return Err(ApiError::Unexpected(format!("Analysis failed: {e:#}")));
            }
        }
    }
}

/// `"{label}\n{text}"` per section, joined by [`SECTION_SEPARATOR`].
pub fn render_sections(sections: &[PersonaSection]) -> String {
    sections
        .iter()
        .map(|s| format!("{}\n{}", s.label, s.text))
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}
