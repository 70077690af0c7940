// In-page stats overlay.
//
// `format_overlay` turns a snapshot into the two text lines shown in the page;
// `OverlayInjector` wraps them in a script that creates the overlay container
// on first use and afterwards only replaces its text.

use std::sync::Arc;

use serde_json::Value;

use crate::stats::PlayerSnapshot;
use crate::surface::{Surface, SurfaceError};

/// DOM id of the overlay container. Its presence marks the overlay as built.
pub const CONTAINER_ID: &str = "rooko-stats-bar";
/// DOM id of the text region inside the container.
pub const TEXT_ID: &str = "rooko-stats-text";
/// Host callback invoked by the overlay's Home button.
pub const HOME_CALLBACK: &str = "go_home";

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// `🔥 n` for a win streak, `❄️ n` for a losing streak, `0` otherwise.
pub fn streak_text(streak: i32) -> String {
    match streak {
        s if s > 0 => format!("🔥 {s}"),
        s if s < 0 => format!("❄️ {}", s.unsigned_abs()),
        _ => "0".to_string(),
    }
}

/// Two-line overlay text: ratings and win rate, then sparkline and streak.
pub fn format_overlay(snapshot: &PlayerSnapshot, sparkline: &str) -> String {
    let r = &snapshot.ratings;
    let win_rate = or_na(snapshot.win_rate.map(|w| format!("{w:.1}")));
    let main = format!(
        "You ⚡{}  🔥{}  ⏳{}  🏆{}%",
        or_na(r.bullet),
        or_na(r.blitz),
        or_na(r.rapid),
        win_rate
    );

    let streak = streak_text(snapshot.streak);
    let sub = if sparkline.is_empty() {
        format!("Streak: {streak}")
    } else {
        format!("📊 {sparkline}   Streak: {streak}")
    };

    format!("{main}\n{sub}")
}

// ---------------------------------------------------------------------------
// Page scripts
// ---------------------------------------------------------------------------

/// Encode `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

/// Script that builds the overlay if it is missing and sets its text.
///
/// The output depends only on `text`, so repeated calls are identical and the
/// id guard makes them idempotent in the page.
pub fn overlay_script(text: &str) -> String {
    format!(
        r#"(function() {{
    var content = {content};
    var bar = document.getElementById({container});
    if (!bar) {{
        bar = document.createElement('div');
        bar.id = {container};
        bar.style.cssText = 'background-color:#262522;color:#fff;padding:8px 12px;font-size:13px;'
            + 'font-family:Arial,sans-serif;border-radius:20px;box-shadow:0 2px 4px rgba(0,0,0,0.3);'
            + 'display:flex;flex-direction:column;align-items:flex-start;white-space:pre;margin:8px;gap:6px;';
        var text = document.createElement('div');
        text.id = {text_id};
        var home = document.createElement('button');
        home.textContent = 'Home';
        home.style.cssText = 'background:transparent;border:1px solid #fff;color:#fff;padding:4px 10px;'
            + 'border-radius:6px;cursor:pointer;font-size:13px;align-self:flex-start;';
        home.addEventListener('click', function() {{
            if (window.rooko) {{ window.rooko.callback({callback}); }}
        }});
        bar.appendChild(text);
        bar.appendChild(home);
        var host = document.querySelector('.board-layout-sidebar')
            || document.querySelector('.board-layout')
            || document.body;
        host.insertBefore(bar, host.firstChild);
    }}
    var statsText = document.getElementById({text_id});
    if (statsText) {{ statsText.textContent = content; }}
}})();"#,
        content = js_string(text),
        container = js_string(CONTAINER_ID),
        text_id = js_string(TEXT_ID),
        callback = js_string(HOME_CALLBACK),
    )
}

/// Script that sends the page to `url`.
pub fn navigation_script(url: &str) -> String {
    format!("window.location.href = {};", js_string(url))
}

// ---------------------------------------------------------------------------
// Injector
// ---------------------------------------------------------------------------

pub struct OverlayInjector {
    surface: Arc<dyn Surface>,
}

impl OverlayInjector {
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self { surface }
    }

    /// Create-or-update the overlay with `text`. Safe to call on every tick;
    /// if the page is not ready the host drops the script and the next tick
    /// tries again.
    pub async fn inject(&self, text: &str) -> Result<(), SurfaceError> {
        self.surface.run_script(&overlay_script(text)).await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
