// Library root: re-exports all modules so integration tests and the binary
// can access the crate's public API.

pub mod bridge;
pub mod config;
pub mod overlay;
pub mod playtime;
pub mod refresh;
pub mod session;
pub mod sparkline;
pub mod stats;
pub mod surface;
