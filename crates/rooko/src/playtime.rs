// Playtime ledger and accumulator.
//
// The ledger is a single decimal number of seconds in a text file. It is
// owned by the accumulator loop, which counts one second per tick while the
// page is in the play context and rewrites the file on every tick outside it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::session::ContextRules;
use crate::surface::{location_or_empty, Surface};

pub const ACCUMULATOR_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to write playtime ledger {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `HH:MM:SS`; hours are not wrapped.
pub fn format_playtime(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Ledger file contents to seconds. Anything that is not a non-negative
/// integer counts as zero.
pub fn parse_total(text: &str) -> u64 {
    text.trim().parse().unwrap_or(0)
}

/// Non-blank ledger text that is not a valid total.
fn is_corrupt(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text.parse::<u64>().is_err()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PlaytimeLedger {
    path: PathBuf,
    total_seconds: u64,
}

impl PlaytimeLedger {
    /// Read the ledger at `path`. A missing, unreadable or corrupt file
    /// starts the count at zero.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let total_seconds = match std::fs::read_to_string(&path) {
            Ok(text) => {
                if is_corrupt(&text) {
                    warn!(
                        "playtime ledger {} is corrupt, starting from zero",
                        path.display()
                    );
                }
                parse_total(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!("failed to read playtime ledger {}: {e}", path.display());
                0
            }
        };
        Self {
            path,
            total_seconds,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    /// Count one more second of play (in memory only).
    pub fn add_second(&mut self) -> u64 {
        self.total_seconds = self.total_seconds.saturating_add(1);
        self.total_seconds
    }

    /// Overwrite the ledger file with the current total.
    ///
    /// The value is written to a sibling temp file and renamed into place, so
    /// a reader never sees a half-written number.
    pub fn flush(&self) -> Result<(), LedgerError> {
        let write_err = |source: std::io::Error| LedgerError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, self.total_seconds.to_string()).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

// ---------------------------------------------------------------------------
// Accumulator loop
// ---------------------------------------------------------------------------

pub struct PlaytimeAccumulator {
    surface: Arc<dyn Surface>,
    rules: ContextRules,
    ledger: PlaytimeLedger,
    was_playing: bool,
}

impl PlaytimeAccumulator {
    pub fn new(surface: Arc<dyn Surface>, rules: ContextRules, ledger: PlaytimeLedger) -> Self {
        Self {
            surface,
            rules,
            ledger,
            was_playing: false,
        }
    }

    pub fn ledger(&self) -> &PlaytimeLedger {
        &self.ledger
    }

    /// One second of bookkeeping: count while playing, persist otherwise.
    /// A failed location query counts as not playing.
    pub async fn tick(&mut self) -> Result<(), LedgerError> {
        let location = location_or_empty(self.surface.as_ref()).await;
        let playing = self.rules.is_playing(&location);
        let was_playing = std::mem::replace(&mut self.was_playing, playing);

        if playing {
            self.ledger.add_second();
            return Ok(());
        }

        if was_playing {
            info!(
                "left play context, total playtime {}",
                format_playtime(self.ledger.total_seconds())
            );
        }
        self.ledger.flush()
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(ACCUMULATOR_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "playtime accumulator started at {}",
            format_playtime(self.ledger.total_seconds())
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!("{e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
