// Overlay refresh loop.
//
// Every few seconds, while the page is anywhere on the host site, rebuild the
// player snapshot and push it into the page. Failures are logged and the loop
// carries on; it only ends with the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::overlay::{format_overlay, OverlayInjector};
use crate::session::ContextRules;
use crate::sparkline;
use crate::stats::StatsAggregator;
use crate::surface::Surface;

pub struct RefreshLoop {
    surface: Arc<dyn Surface>,
    aggregator: Arc<StatsAggregator>,
    injector: OverlayInjector,
    rules: ContextRules,
    username: String,
    show_graph: bool,
    interval: Duration,
}

impl RefreshLoop {
    pub fn new(
        surface: Arc<dyn Surface>,
        aggregator: Arc<StatsAggregator>,
        rules: ContextRules,
        username: String,
        show_graph: bool,
        interval: Duration,
    ) -> Self {
        Self {
            injector: OverlayInjector::new(surface.clone()),
            surface,
            aggregator,
            rules,
            username,
            show_graph,
            interval,
        }
    }

    /// Refresh once. Returns `Ok(false)` when nothing reached the page, either
    /// because it is off-site or because the host refused the script.
    pub async fn tick(&self) -> anyhow::Result<bool> {
        let location = self.surface.current_location().await?;
        if !self.rules.is_on_site(&location) {
            return Ok(false);
        }

        let snapshot = self.aggregator.snapshot(&self.username).await;
        let graph = sparkline::render(&snapshot.rating_trend, self.show_graph);
        let text = format_overlay(&snapshot, &graph);
        if let Err(e) = self.injector.inject(&text).await {
            // The next tick sends a fresh script anyway.
            debug!("overlay script not delivered: {e}");
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "overlay refresh loop started (every {}s)",
            self.interval.as_secs()
        );

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(true) => debug!("overlay refreshed"),
                Ok(false) => debug!("overlay not refreshed this tick"),
                Err(e) => warn!("overlay refresh failed: {e:#}"),
            }
        }
    }
}
