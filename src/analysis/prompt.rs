//! Prompt construction for persona calls.
//!
//! Each prompt carries the pre-sorted stat summaries and a play-type edge
//! table so the model reasons about the matchup instead of re-deriving it.

use crate::analysis::personas::Persona;
use crate::analysis::{AnalysisRequest, DefenseStatLine, PersonaSection, PlayerStatLine};

/// Defensive rank at or below which a play type is a tough spot for the offense.
pub const TOUGH_RANK: u32 = 10;
/// Defensive rank at or above which a play type is a favorable spot for the offense.
pub const FAVORABLE_RANK: u32 = 21;

/// `"Isolation: 6.2 PTS, Cut: 3.0 PTS"`, highest scoring play type first.
pub fn format_player_stats(stats: &[PlayerStatLine]) -> String {
    let mut sorted: Vec<&PlayerStatLine> = stats.iter().collect();
    sorted.sort_by(|a, b| b.pts.total_cmp(&a.pts));
    sorted
        .iter()
        .map(|s| format!("{}: {:.1} PTS", s.play_type, s.pts))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"Isolation: Rank #3 (0.85 PPP)"`, best defensive rank first.
pub fn format_defense_stats(stats: &[DefenseStatLine]) -> String {
    let mut sorted: Vec<&DefenseStatLine> = stats.iter().collect();
    sorted.sort_by_key(|s| s.rank);
    sorted
        .iter()
        .map(|s| format!("{}: Rank #{} ({:.2} PPP)", s.play_type, s.rank, s.ppp))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line per play type present on both sides, in the player's scoring order.
pub fn matchup_edges(player: &[PlayerStatLine], defense: &[DefenseStatLine]) -> Vec<String> {
    let mut sorted: Vec<&PlayerStatLine> = player.iter().collect();
    sorted.sort_by(|a, b| b.pts.total_cmp(&a.pts));

    sorted
        .iter()
        .filter_map(|p| {
            let d = defense
                .iter()
                .find(|d| d.play_type.eq_ignore_ascii_case(&p.play_type))?;
            let verdict = if d.rank >= FAVORABLE_RANK {
                "favorable for offense"
            } else if d.rank <= TOUGH_RANK {
                "tough for offense"
            } else {
                "neutral"
            };
            Some(format!(
                "{}: {:.1} PTS vs defense Rank #{} ({:.2} PPP) -> {}",
                p.play_type, p.pts, d.rank, d.ppp, verdict
            ))
        })
        .collect()
}

/// Shared matchup block included in every persona prompt.
pub fn matchup_context(request: &AnalysisRequest) -> String {
    let edges = matchup_edges(&request.player_stats, &request.defense_stats);
    let edges = if edges.is_empty() {
        "No overlapping play types.".to_string()
    } else {
        edges.join("\n")
    };

    format!(
        "MATCHUP: {player} vs {team}\n\
         \n\
         PLAYER OFFENSIVE STATS:\n\
         {offense}\n\
         \n\
         TEAM DEFENSIVE STATS:\n\
         {defense}\n\
         \n\
         PLAY-TYPE EDGES:\n\
         {edges}",
        player = request.player_name,
        team = request.team_name,
        offense = non_empty(format_player_stats(&request.player_stats)),
        defense = non_empty(format_defense_stats(&request.defense_stats)),
        edges = edges,
    )
}

fn non_empty(s: String) -> String {
    if s.is_empty() {
        "(none provided)".to_string()
    } else {
        s
    }
}

pub fn fill_placeholders(template: &str, request: &AnalysisRequest) -> String {
    template
        .replace("{player}", &request.player_name)
        .replace("{team}", &request.team_name)
}

pub fn system_prompt(persona: &Persona, request: &AnalysisRequest) -> String {
    fill_placeholders(&persona.role, request)
}

/// User prompt for one persona: matchup block, then prior analysts' sections
/// when the persona reads them, then its task.
pub fn user_prompt(
    persona: &Persona,
    request: &AnalysisRequest,
    context: &str,
    prior: &[PersonaSection],
) -> String {
    let mut prompt = String::from(context);

    if persona.uses_prior_outputs && !prior.is_empty() {
        prompt.push_str("\n\nANALYST PERSPECTIVES SO FAR:");
        for section in prior {
            prompt.push_str(&format!("\n\n{}\n{}", section.label, section.text));
        }
    }

    prompt.push_str("\n\nYOUR TASK:\n");
    prompt.push_str(&fill_placeholders(&persona.instructions, request));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisPayload;

    fn p(play_type: &str, pts: f64) -> PlayerStatLine {
        PlayerStatLine {
            play_type: play_type.to_string(),
            pts,
        }
    }

    fn d(play_type: &str, rank: u32, ppp: f64) -> DefenseStatLine {
        DefenseStatLine {
            play_type: play_type.to_string(),
            rank,
            ppp,
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisPayload {
            player_name: Some("Jimmy Butler III".to_string()),
            team_name: Some("Boston Celtics".to_string()),
            player_stats: vec![p("Cut", 1.5), p("Isolation", 6.24), p("Post-Up", 3.0)],
            defense_stats: vec![d("Post-Up", 25, 1.1), d("Isolation", 3, 0.851), d("Transition", 14, 1.0)],
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_player_stats_sorted_descending() {
        let r = request();
        assert_eq!(
            format_player_stats(&r.player_stats),
            "Isolation: 6.2 PTS, Post-Up: 3.0 PTS, Cut: 1.5 PTS"
        );
    }

    #[test]
    fn test_defense_stats_sorted_by_rank() {
        let r = request();
        assert_eq!(
            format_defense_stats(&r.defense_stats),
            "Isolation: Rank #3 (0.85 PPP), Transition: Rank #14 (1.00 PPP), Post-Up: Rank #25 (1.10 PPP)"
        );
    }

    #[test]
    fn test_matchup_edges() {
        let r = request();
        let edges = matchup_edges(&r.player_stats, &r.defense_stats);
        assert_eq!(edges.len(), 2);
        assert!(edges[0].starts_with("Isolation: 6.2 PTS vs defense Rank #3"));
        assert!(edges[0].ends_with("tough for offense"));
        assert!(edges[1].ends_with("favorable for offense"));
    }

    #[test]
    fn test_prior_outputs_only_for_reading_personas() {
        let r = request();
        let context = matchup_context(&r);
        let prior = vec![PersonaSection {
            key: "offensive_specialist".to_string(),
            label: "OFFENSE".to_string(),
            text: "He feasts in isolation.".to_string(),
        }];

        let plain = Persona::new("a", "A", "role", "Judge {player} vs {team}.");
        let prompt = user_prompt(&plain, &r, &context, &prior);
        assert!(!prompt.contains("He feasts"));
        assert!(prompt.ends_with("Judge Jimmy Butler III vs Boston Celtics."));

        let reader = plain.with_prior_outputs();
        let prompt = user_prompt(&reader, &r, &context, &prior);
        assert!(prompt.contains("ANALYST PERSPECTIVES SO FAR"));
        assert!(prompt.contains("OFFENSE\nHe feasts in isolation."));
    }

    #[test]
    fn test_context_handles_missing_stats() {
        let mut r = request();
        r.player_stats.clear();
        let context = matchup_context(&r);
        assert!(context.contains("PLAYER OFFENSIVE STATS:\n(none provided)"));
        assert!(context.contains("No overlapping play types."));
    }
}
