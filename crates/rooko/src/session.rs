// Session state observer.
//
// Polls the page location once a second, classifies it against the context
// rules, and starts the overlay refresh loop the first time the player enters
// a game. The refresh loop is started at most once per process: leaving and
// re-entering the play context neither stops nor respawns it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::ContextConfig;
use crate::refresh::RefreshLoop;
use crate::surface::{location_or_empty, Surface};

pub const OBSERVER_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Context rules
// ---------------------------------------------------------------------------

/// Substring rules that decide what a location means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRules {
    /// Locations containing this are "actively playing".
    pub play_marker: String,
    /// Locations containing this are somewhere on the host site.
    pub site_marker: String,
}

impl ContextRules {
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            play_marker: config.play_marker.clone(),
            site_marker: config.site_marker.clone(),
        }
    }

    pub fn is_playing(&self, location: &str) -> bool {
        location.contains(&self.play_marker)
    }

    pub fn is_on_site(&self, location: &str) -> bool {
        location.contains(&self.site_marker)
    }
}

impl Default for ContextRules {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Where the page is and whether that counts as playing. Recomputed on every
/// poll, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub current_location: String,
    pub in_target_context: bool,
}

impl SessionState {
    pub fn classify(location: String, rules: &ContextRules) -> Self {
        let in_target_context = rules.is_playing(&location);
        Self {
            current_location: location,
            in_target_context,
        }
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

pub struct SessionObserver {
    surface: Arc<dyn Surface>,
    rules: ContextRules,
    state: SessionState,
    /// Taken on the first entry into the play context; `None` afterwards.
    pending_refresh: Option<RefreshLoop>,
}

impl SessionObserver {
    pub fn new(surface: Arc<dyn Surface>, rules: ContextRules, refresh: RefreshLoop) -> Self {
        Self {
            surface,
            rules,
            state: SessionState::default(),
            pending_refresh: Some(refresh),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn refresh_started(&self) -> bool {
        self.pending_refresh.is_none()
    }

    /// Poll once. Returns the refresh loop when this poll is the first entry
    /// into the play context; the caller is expected to spawn it.
    ///
    /// A failed location query reads as an empty location.
    pub async fn tick(&mut self) -> Option<RefreshLoop> {
        let location = location_or_empty(self.surface.as_ref()).await;
        let next = SessionState::classify(location, &self.rules);

        match (self.state.in_target_context, next.in_target_context) {
            (false, true) => info!("entered play context at {}", next.current_location),
            (true, false) => info!("left play context"),
            _ => debug!(location = %next.current_location, "session poll"),
        }

        self.state = next;
        if self.state.in_target_context {
            self.pending_refresh.take()
        } else {
            None
        }
    }

    /// Poll forever at [`OBSERVER_INTERVAL`].
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(OBSERVER_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("session observer started");

        loop {
            ticker.tick().await;
            if let Some(refresh) = self.tick().await {
                info!("starting overlay refresh loop");
                tokio::spawn(refresh.run());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
