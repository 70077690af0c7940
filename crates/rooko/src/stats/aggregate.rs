// Player snapshot aggregation.
//
// Pulls the rating summary and the most recent month of games for a player,
// then derives win rate, the current streak, and a rating trend over the last
// ten games. The aggregator never fails outward: any fetch error degrades to a
// neutral (or ratings-only) snapshot and is logged.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::fetch::{FetchError, JsonFetcher};

/// How many of the most recent games feed the derived stats.
pub const RECENT_GAMES: usize = 10;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Latest rating per time control. Absent when the player has no rated games
/// in that format (or the API omitted the field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ratings {
    pub bullet: Option<i64>,
    pub blitz: Option<i64>,
    pub rapid: Option<i64>,
}

impl Ratings {
    /// Rating to chart for a game whose own post-game rating is missing.
    pub fn fallback_rating(&self) -> i64 {
        self.blitz.or(self.bullet).or(self.rapid).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

impl Side {
    fn key(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Loss,
    Draw,
    Other,
}

impl GameResult {
    /// Classify a chess.com per-side result code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "win" => GameResult::Win,
            "checkmated" | "resigned" | "timeout" | "abandoned" | "lose" | "loss"
            | "kingofthehill" | "threecheck" | "bughousepartnerlose" => GameResult::Loss,
            "agreed" | "repetition" | "stalemate" | "insufficient" | "50move"
            | "timevsinsufficient" | "draw" => GameResult::Draw,
            _ => GameResult::Other,
        }
    }
}

/// One game from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameRecord {
    pub side: Side,
    pub result: GameResult,
    pub rating_after: i64,
}

/// Ratings plus analytics derived from the recent games. Rebuilt on every
/// aggregator call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub ratings: Ratings,
    /// Oldest first, at most [`RECENT_GAMES`] entries.
    pub recent_games: Vec<GameRecord>,
    /// Percentage of wins, one decimal. `None` without games.
    pub win_rate: Option<f64>,
    /// Positive for a run of wins ending at the latest game, negative for
    /// losses, 0 otherwise.
    pub streak: i32,
    pub rating_trend: Vec<i64>,
}

impl PlayerSnapshot {
    /// Everything absent. Used when even the ratings could not be fetched.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Ratings with no game-derived data.
    pub fn ratings_only(ratings: Ratings) -> Self {
        Self {
            ratings,
            ..Self::default()
        }
    }

    /// Derive the snapshot from chronologically ordered games. Only the last
    /// [`RECENT_GAMES`] are used.
    pub fn from_games(ratings: Ratings, games: Vec<GameRecord>) -> Self {
        let skip = games.len().saturating_sub(RECENT_GAMES);
        let recent_games: Vec<GameRecord> = games.into_iter().skip(skip).collect();
        let results: Vec<GameResult> = recent_games.iter().map(|g| g.result).collect();

        Self {
            ratings,
            win_rate: compute_win_rate(&results),
            streak: compute_streak(&results),
            rating_trend: recent_games.iter().map(|g| g.rating_after).collect(),
            recent_games,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived analytics
// ---------------------------------------------------------------------------

/// Signed run length ending at the last result.
///
/// A win extends a preceding win run, otherwise restarts at +1; losses mirror
/// this with negative values. Draws and other results keep the current value
/// but break the chain, so the next win or loss starts fresh.
pub fn compute_streak(results: &[GameResult]) -> i32 {
    let mut streak = 0;
    let mut last: Option<GameResult> = None;

    for &result in results {
        match result {
            GameResult::Win => {
                streak = if last == Some(GameResult::Win) { streak + 1 } else { 1 };
            }
            GameResult::Loss => {
                streak = if last == Some(GameResult::Loss) { streak - 1 } else { -1 };
            }
            GameResult::Draw | GameResult::Other => {}
        }
        last = Some(result);
    }

    streak
}

/// Share of wins as a percentage rounded to one decimal.
pub fn compute_win_rate(results: &[GameResult]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let wins = results.iter().filter(|r| **r == GameResult::Win).count();
    let pct = wins as f64 / results.len() as f64 * 100.0;
    Some((pct * 10.0).round() / 10.0)
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------
//
// chess.com responses are read through `Value` accessors so a missing or
// mistyped field only blanks that field instead of failing the whole decode.

fn last_rating(stats: &Value, format: &str) -> Option<i64> {
    stats.get(format)?.get("last")?.get("rating")?.as_i64()
}

/// Extract per-format ratings from a `/player/{u}/stats` body.
pub fn parse_ratings(stats: &Value) -> Ratings {
    Ratings {
        bullet: last_rating(stats, "chess_bullet"),
        blitz: last_rating(stats, "chess_blitz"),
        rapid: last_rating(stats, "chess_rapid"),
    }
}

/// Extract the monthly archive URLs (chronological) from a
/// `/player/{u}/games/archives` body.
pub fn parse_archives(body: &Value) -> Vec<String> {
    body.get("archives")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_game(game: &Value, username: &str, fallback_rating: i64) -> Option<GameRecord> {
    let white = game.get("white")?.get("username")?.as_str()?;
    let side = if white.eq_ignore_ascii_case(username) {
        Side::White
    } else {
        Side::Black
    };
    let player = game.get(side.key())?;

    let result = player
        .get("result")
        .and_then(Value::as_str)
        .map(GameResult::from_code)
        .unwrap_or(GameResult::Other);
    let rating_after = player
        .get("rating")
        .and_then(Value::as_i64)
        .unwrap_or(fallback_rating);

    Some(GameRecord {
        side,
        result,
        rating_after,
    })
}

/// Decode the games of one monthly archive from `username`'s perspective,
/// in archive (chronological) order. Games without player info are skipped.
pub fn parse_games(body: &Value, username: &str, fallback_rating: i64) -> Vec<GameRecord> {
    let Some(games) = body.get("games").and_then(Value::as_array) else {
        return Vec::new();
    };

    games
        .iter()
        .filter_map(|g| {
            let parsed = parse_game(g, username, fallback_rating);
            if parsed.is_none() {
                debug!("skipping game without player info");
            }
            parsed
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct StatsAggregator {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
}

impl StatsAggregator {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { fetcher, base_url }
    }

    pub fn stats_url(&self, username: &str) -> String {
        format!("{}/player/{username}/stats", self.base_url)
    }

    pub fn archives_url(&self, username: &str) -> String {
        format!("{}/player/{username}/games/archives", self.base_url)
    }

    /// Build a fresh snapshot for `username`.
    ///
    /// The three requests run strictly in sequence. If the rating summary
    /// cannot be fetched the result is fully neutral; if a later request
    /// fails, the ratings are kept and the game-derived fields stay empty.
    pub async fn snapshot(&self, username: &str) -> PlayerSnapshot {
        let ratings = match self.fetcher.get_json(&self.stats_url(username)).await {
            Ok(body) => parse_ratings(&body),
            Err(e) => {
                warn!("failed to fetch ratings for {username}: {e}");
                return PlayerSnapshot::neutral();
            }
        };

        match self.recent_games(username, &ratings).await {
            Ok(games) => PlayerSnapshot::from_games(ratings, games),
            Err(e) => {
                warn!("failed to fetch recent games for {username}: {e}");
                PlayerSnapshot::ratings_only(ratings)
            }
        }
    }

    async fn recent_games(
        &self,
        username: &str,
        ratings: &Ratings,
    ) -> Result<Vec<GameRecord>, FetchError> {
        let archives = parse_archives(&self.fetcher.get_json(&self.archives_url(username)).await?);
        let Some(latest) = archives.last() else {
            debug!("{username} has no game archives");
            return Ok(Vec::new());
        };

        let month = self.fetcher.get_json(latest).await?;
        Ok(parse_games(&month, username, ratings.fallback_rating()))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
