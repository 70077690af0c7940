pub mod aggregate;
pub mod fetch;

pub use aggregate::{GameRecord, GameResult, PlayerSnapshot, Ratings, Side, StatsAggregator};
pub use fetch::{FetchError, HttpFetcher, JsonFetcher};
