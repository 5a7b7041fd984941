//! Analyst personas for the matchup debate.
//!
//! Each persona is plain data: a label for the combined report, a system
//! prompt describing the viewpoint, and task instructions. `{player}` and
//! `{team}` placeholders are filled in per request. Personas that read prior
//! outputs see every earlier persona's text in their prompt.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub key: String,
    /// Section heading in the combined analysis.
    pub label: String,
    pub role: String,
    pub instructions: String,
    pub uses_prior_outputs: bool,
}

impl Persona {
    pub fn new(key: &str, label: &str, role: &str, instructions: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            role: role.to_string(),
            instructions: instructions.to_string(),
            uses_prior_outputs: false,
        }
    }

    pub fn with_prior_outputs(mut self) -> Self {
        self.uses_prior_outputs = true;
        self
    }
}

const OFFENSIVE_ROLE: &str = "You are an Offensive Analytics Specialist. You study player strengths and \
scoring patterns and believe in {player}'s ability to exploit defensive weaknesses. You are \
enthusiastic but back every claim with the numbers provided.";

const OFFENSIVE_TASK: &str = "Build the case for why {player} will succeed against {team}:\n\
- Identify the 2-3 strongest play types and why they will work\n\
- Point to the defensive play types where {team} ranks poorly\n\
- Make your most compelling argument for the OVER on player props\n\
\n\
Keep it focused (150-200 words). Be enthusiastic but evidence-based.";

const DEFENSIVE_ROLE: &str = "You are a Defensive Strategy Analyst. You focus on team schemes and how \
defenses neutralize offensive threats. You believe {team} has the tools to limit {player}. You are \
skeptical but fair.";

const DEFENSIVE_TASK: &str = "Build the case for why {team} will contain {player}:\n\
- Identify the 2-3 defensive play types that line up against the player's strengths\n\
- Highlight where the defense ranks near the top of the league\n\
- Make your most compelling argument for the UNDER on player props\n\
\n\
Keep it focused (150-200 words). Be realistic but defense-focused.";

const NEUTRAL_ROLE: &str = "You are a Neutral Statistical Analyst. You favor neither offense nor \
defense and call it as the data shows. You mediate between optimistic and pessimistic views with \
probabilities and trends.";

const NEUTRAL_TASK: &str = "Review the offensive and defensive specialists' arguments below:\n\
- Call out claims the numbers do not support\n\
- Present the statistical picture objectively\n\
- Separate the factors that matter from the noise\n\
\n\
Keep it focused (150-200 words). Be completely objective.";

const STRATEGIST_ROLE: &str = "You are a Sports Betting Strategist and the final decision-maker. You \
weigh competing arguments, identify which analyst made the strongest case, and give concrete \
betting advice. You are decisive but honest about uncertainty.";

const STRATEGIST_TASK: &str = "Review all three analysts' perspectives below:\n\
1. Summarize which analyst made the strongest points and why\n\
2. Identify where the analysts agree and disagree\n\
3. Give your verdict on the most likely outcome\n\
4. Provide 2-3 SPECIFIC betting recommendations (player props, team totals, etc.)\n\
5. Assign a confidence level (HIGH/MEDIUM/LOW) to each, with reasoning\n\
\n\
This is the final word (200-250 words).";

/// Offensive specialist, defensive specialist, neutral analyst, then the
/// betting strategist who writes the closing recommendation.
pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona::new(
            "offensive_specialist",
            "🔵 OFFENSIVE SPECIALIST PERSPECTIVE",
            OFFENSIVE_ROLE,
            OFFENSIVE_TASK,
        ),
        Persona::new(
            "defensive_specialist",
            "🔴 DEFENSIVE SPECIALIST PERSPECTIVE",
            DEFENSIVE_ROLE,
            DEFENSIVE_TASK,
        ),
        Persona::new(
            "neutral_analyst",
            "⚪ NEUTRAL ANALYST PERSPECTIVE",
            NEUTRAL_ROLE,
            NEUTRAL_TASK,
        )
        .with_prior_outputs(),
        Persona::new(
            "betting_strategist",
            "🎯 FINAL BETTING RECOMMENDATION",
            STRATEGIST_ROLE,
            STRATEGIST_TASK,
        )
        .with_prior_outputs(),
    ]
}
