pub mod nba;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which side of the ball a play-type table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Offense,
    Defense,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Offense => write!(f, "offense"),
            Side::Defense => write!(f, "defense"),
        }
    }
}

/// One player's scoring output in a single offensive play type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffenseRow {
    pub player: String,
    pub team: String,
    /// Points per game from this play type.
    pub pts: f64,
}

/// One team's defensive efficiency against a single play type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseRow {
    pub team: String,
    /// 1 = stingiest defense (lowest PPP allowed).
    pub rank: u32,
    /// Points per possession allowed.
    pub ppp: f64,
}

/// An ordered table of rows for exactly one play type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayTypeTable<R> {
    pub play_type: String,
    pub rows: Vec<R>,
}

impl<R> PlayTypeTable<R> {
    pub fn new(play_type: impl Into<String>, rows: Vec<R>) -> Self {
        Self {
            play_type: play_type.into(),
            rows,
        }
    }
}

/// Source of play-type tables.
///
/// `Ok(None)` means the source answered but had no usable table for that
/// play type; the refresher treats it the same as an error and omits it.
#[async_trait]
pub trait StatsFetcher: Send + Sync {
    async fn fetch_offense(
        &self,
        url: &str,
        play_type: &str,
    ) -> Result<Option<PlayTypeTable<OffenseRow>>>;

    async fn fetch_defense(
        &self,
        url: &str,
        play_type: &str,
    ) -> Result<Option<PlayTypeTable<DefenseRow>>>;

    /// Wait until the source will accept another request. Callers await this
    /// before each fetch so that queueing is not counted against the fetch
    /// timeout.
    async fn ready(&self) {}

    /// Human-readable name of this source.
    fn name(&self) -> &str;
}
