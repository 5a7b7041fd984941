//! Player, team and matchup lookups over the cached play-type tables.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cache::refresher::CacheRefresher;
use crate::cache::CacheSnapshot;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStat {
    pub play_type: String,
    pub team: String,
    pub pts: f64,
    pub player: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerReport {
    /// Name as spelled in the first matching row.
    pub player: String,
    pub data: Vec<PlayerStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseStat {
    pub play_type: String,
    pub team: String,
    pub rank: u32,
    pub ppp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefenseReport {
    /// Name as spelled in the first matching row.
    pub team: String,
    pub data: Vec<DefenseStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchupReport {
    pub player: PlayerReport,
    pub defense: DefenseReport,
}

pub struct QueryService {
    refresher: Arc<CacheRefresher>,
}

impl QueryService {
    pub fn new(refresher: Arc<CacheRefresher>) -> Self {
        Self { refresher }
    }

    pub async fn query_player(&self, name: &str) -> ApiResult<PlayerReport> {
        let snapshot = self.fresh_snapshot().await;
        find_player(&snapshot, name)
    }

    pub async fn query_team(&self, name: &str) -> ApiResult<DefenseReport> {
        let snapshot = self.fresh_snapshot().await;
        find_team(&snapshot, name)
    }

    /// Player lookup first; the first not-found short-circuits.
    pub async fn query_matchup(&self, player: &str, team: &str) -> ApiResult<MatchupReport> {
        let snapshot = self.fresh_snapshot().await;
        let player = find_player(&snapshot, player)?;
        let defense = find_team(&snapshot, team)?;
        Ok(MatchupReport { player, defense })
    }

    async fn fresh_snapshot(&self) -> Arc<CacheSnapshot> {
        self.refresher.ensure_fresh().await;
        self.refresher.cache().snapshot().await
    }
}

/// Every offensive row whose normalized player name contains the normalized query.
pub fn find_player(snapshot: &CacheSnapshot, name: &str) -> ApiResult<PlayerReport> {
    let needle = normalize_text(name);
    if needle.is_empty() {
        return Err(ApiError::NotFound("Player not found".to_string()));
    }

    let data: Vec<PlayerStat> = snapshot
        .offense
        .iter()
        .flat_map(|table| {
            let needle = &needle;
            table
                .rows
                .iter()
                .filter(move |row| normalize_text(&row.player).contains(needle.as_str()))
                .map(move |row| PlayerStat {
                    play_type: table.play_type.clone(),
                    team: row.team.clone(),
                    pts: row.pts,
                    player: row.player.clone(),
                })
        })
        .collect();

    debug!(query = name, matches = data.len(), "Player lookup");

    match data.first() {
        Some(first) => Ok(PlayerReport {
            player: first.player.clone(),
            data,
        }),
        None => Err(ApiError::NotFound("Player not found".to_string())),
    }
}

/// Every defensive row whose team name contains the query, ignoring case.
pub fn find_team(snapshot: &CacheSnapshot, name: &str) -> ApiResult<DefenseReport> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return Err(ApiError::NotFound("Team not found".to_string()));
    }

    let data: Vec<DefenseStat> = snapshot
        .defense
        .iter()
        .flat_map(|table| {
            let needle = &needle;
            table
                .rows
                .iter()
                .filter(move |row| row.team.to_lowercase().contains(needle.as_str()))
                .map(move |row| DefenseStat {
                    play_type: table.play_type.clone(),
                    team: row.team.clone(),
                    rank: row.rank,
                    ppp: row.ppp,
                })
        })
        .collect();

    debug!(query = name, matches = data.len(), "Team lookup");

    match data.first() {
        Some(first) => Ok(DefenseReport {
            team: first.team.clone(),
            data,
        }),
        None => Err(ApiError::NotFound("Team not found".to_string())),
    }
}

/// Fold a name for matching: lower-case, strip accents and punctuation,
/// collapse separators to single spaces.
///
/// `"P.J. Washington"` and `"pj  washington"` both become `"pj washington"`.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() || ch == '-' || ch == '_' || ch == '/' {
            pending_space = !out.is_empty();
            continue;
        }
        let folded = fold_diacritic(ch);
        if !folded.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(folded);
    }

    out
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ğ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => 'i',
        'ľ' | 'ĺ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ŕ' | 'ř' => 'r',
        'ś' | 'š' | 'ş' | 'ș' => 's',
        'ť' | 'ţ' | 'ț' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::stats::{DefenseRow, OffenseRow, PlayTypeTable};

    fn off(player: &str, team: &str, pts: f64) -> OffenseRow {
        OffenseRow {
            player: player.to_string(),
            team: team.to_string(),
            pts,
        }
    }

    fn def(team: &str, rank: u32, ppp: f64) -> DefenseRow {
        DefenseRow {
            team: team.to_string(),
            rank,
            ppp,
        }
    }

    fn snapshot() -> CacheSnapshot {
        CacheSnapshot {
            offense: vec![
                PlayTypeTable::new(
                    "Isolation",
                    vec![
                        off("Jimmy Butler III", "GSW", 4.1),
                        off("Nikola Jokić", "DEN", 2.0),
                    ],
                ),
                PlayTypeTable::new("Cut", vec![off("Aaron Gordon", "DEN", 3.3)]),
                PlayTypeTable::new("Post-Up", vec![off("Jimmy Butler III", "GSW", 0.0)]),
            ],
            defense: vec![
                PlayTypeTable::new(
                    "Isolation",
                    vec![def("Boston Celtics", 1, 0.79), def("Miami Heat", 2, 0.84)],
                ),
                PlayTypeTable::new("Post-Up", vec![def("Boston Celtics", 7, 0.92)]),
            ],
            refreshed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Jimmy Butler III"), "jimmy butler iii");
        assert_eq!(normalize_text("  P.J.   Washington "), "pj washington");
        assert_eq!(normalize_text("Nikola Jokić"), "nikola jokic");
        assert_eq!(normalize_text("Shai Gilgeous-Alexander"), "shai gilgeous alexander");
        assert_eq!(normalize_text("De'Aaron Fox"), "deaaron fox");
        assert_eq!(normalize_text("..."), "");
    }

    #[test]
    fn test_player_matches_across_play_types() {
        let report = find_player(&snapshot(), "jimmy butler").unwrap();
        assert_eq!(report.player, "Jimmy Butler III");
        assert_eq!(report.data.len(), 2);
        assert_eq!(report.data[0].play_type, "Isolation");
        assert_eq!(report.data[1].play_type, "Post-Up");
        assert!(report
            .data
            .iter()
            .all(|s| normalize_text(&s.player).contains("jimmy butler")));
    }

    #[test]
    fn test_player_accent_insensitive() {
        let report = find_player(&snapshot(), "JOKIC").unwrap();
        assert_eq!(report.player, "Nikola Jokić");
        assert_eq!(report.data[0].team, "DEN");
    }

    #[test]
    fn test_ambiguous_query_returns_every_row() {
        // Jokić and Gordon.
        let report = find_player(&snapshot(), "o").unwrap();
        assert_eq!(report.data.len(), 2);
    }

    #[test]
    fn test_player_not_found() {
        let err = find_player(&snapshot(), "zzz-nonexistent").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref m) if m == "Player not found"));
    }

    #[test]
    fn test_blank_player_query_not_found() {
        assert!(matches!(
            find_player(&snapshot(), " . "),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_team_case_insensitive_substring() {
        let report = find_team(&snapshot(), "celtics").unwrap();
        assert_eq!(report.team, "Boston Celtics");
        assert_eq!(report.data.len(), 2);
        assert_eq!(report.data[0].rank, 1);
        assert_eq!(report.data[1].play_type, "Post-Up");
        assert_eq!(report.data[1].ppp, 0.92);
    }

    #[test]
    fn test_team_not_found() {
        let err = find_team(&snapshot(), "Sonics").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref m) if m == "Team not found"));
    }

    #[test]
    fn test_empty_cache_not_found() {
        let empty = CacheSnapshot::default();
        assert!(find_player(&empty, "butler").is_err());
        assert!(find_team(&empty, "heat").is_err());
    }
}
