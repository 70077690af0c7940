// The embedded content surface as seen by the engine.
//
// Every loop talks to the page through this trait: it can ask where the page
// currently is and push a script into it. The production implementation is
// the WebSocket bridge; tests substitute scripted fakes.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("no page is connected to the bridge")]
    Disconnected,

    #[error("script queue is full, dropping script")]
    QueueFull,

    #[error("script queue is closed")]
    QueueClosed,
}

/// Host operations consumed by the engine loops.
#[async_trait]
pub trait Surface: Send + Sync {
    /// The URL the page is currently showing.
    async fn current_location(&self) -> Result<String, SurfaceError>;

    /// Run `source` in the page context. Fire-and-forget: success only means
    /// the script was handed to the host.
    async fn run_script(&self, source: &str) -> Result<(), SurfaceError>;
}

/// Query the current location, mapping any failure to an empty string.
///
/// Loops that only need to classify the location use this so a flaky host
/// reads as "somewhere else" rather than aborting the tick.
pub async fn location_or_empty(surface: &dyn Surface) -> String {
    match surface.current_location().await {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("location query failed: {e}");
            String::new()
        }
    }
}
