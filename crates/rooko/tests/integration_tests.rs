// Integration tests for Rooko.
//
// These tests drive the library through its public API: config bootstrap,
// the stats pipeline feeding the overlay, the session latch, the playtime
// ledger, and the WebSocket bridge over a real loopback socket.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use rooko::bridge;
use rooko::config::{self, AppDirs, ConfigError};
use rooko::overlay::{format_overlay, navigation_script, CONTAINER_ID};
use rooko::playtime::{PlaytimeAccumulator, PlaytimeLedger};
use rooko::refresh::RefreshLoop;
use rooko::session::{ContextRules, SessionObserver};
use rooko::sparkline;
use rooko::stats::{FetchError, JsonFetcher, StatsAggregator};
use rooko::surface::{Surface, SurfaceError};

// ===========================================================================
// Test helpers
// ===========================================================================

const BASE: &str = "https://api.chess.com/pub";
const PLAY: &str = "https://www.chess.com/play/online";
const HOME: &str = "https://www.chess.com/home";

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rooko_it_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Page stand-in whose location can be moved by the test.
#[derive(Default)]
struct ScriptedPage {
    location: Mutex<Option<String>>,
    scripts: Mutex<Vec<String>>,
}

impl ScriptedPage {
    fn at(url: &str) -> Arc<Self> {
        let page = Arc::new(Self::default());
        page.go(url);
        page
    }

    fn go(&self, url: &str) {
        *self.location.lock().unwrap() = Some(url.to_string());
    }

    fn disconnect(&self) {
        *self.location.lock().unwrap() = None;
    }

    fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Surface for ScriptedPage {
    async fn current_location(&self) -> Result<String, SurfaceError> {
        self.location
            .lock()
            .unwrap()
            .clone()
            .ok_or(SurfaceError::Disconnected)
    }

    async fn run_script(&self, source: &str) -> Result<(), SurfaceError> {
        self.scripts.lock().unwrap().push(source.to_string());
        Ok(())
    }
}

/// Canned chess.com responses keyed by URL; anything else is a 404.
#[derive(Default)]
struct CannedApi {
    bodies: HashMap<String, Value>,
    requests: Mutex<Vec<String>>,
}

impl CannedApi {
    fn with(mut self, url: &str, body: Value) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl JsonFetcher for CannedApi {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn game(white: &str, black: &str, white_result: &str, black_result: &str, rating: i64) -> Value {
    json!({
        "white": { "username": white, "rating": rating, "result": white_result },
        "black": { "username": black, "rating": rating - 100, "result": black_result },
    })
}

/// A player with full ratings and four games in the latest month, the last
/// two of them wins.
fn full_api() -> CannedApi {
    let month = format!("{BASE}/player/hikaru/games/2024/05");
    CannedApi::default()
        .with(
            &format!("{BASE}/player/hikaru/stats"),
            json!({
                "chess_bullet": { "last": { "rating": 3200 } },
                "chess_blitz": { "last": { "rating": 3150 } },
                "chess_rapid": { "last": { "rating": 2900 } },
            }),
        )
        .with(
            &format!("{BASE}/player/hikaru/games/archives"),
            json!({ "archives": [format!("{BASE}/player/hikaru/games/2024/04"), month] }),
        )
        .with(
            &month,
            json!({
                "games": [
                    game("Hikaru", "x", "checkmated", "win", 3100),
                    game("y", "Hikaru", "agreed", "agreed", 3210),
                    game("Hikaru", "z", "win", "resigned", 3120),
                    game("Hikaru", "w", "win", "timeout", 3150),
                ]
            }),
        )
}

fn refresh_loop(page: Arc<ScriptedPage>, api: Arc<CannedApi>) -> RefreshLoop {
    RefreshLoop::new(
        page,
        Arc::new(StatsAggregator::new(api, BASE)),
        ContextRules::default(),
        "hikaru".into(),
        true,
        Duration::from_secs(5),
    )
}

// ===========================================================================
// Config bootstrap
// ===========================================================================

#[test]
fn first_run_writes_defaults_and_loads_them() {
    let root = scratch_dir("config_bootstrap");
    let dirs = AppDirs {
        config_dir: root.join("config"),
        data_dir: root.join("data"),
    };

    let config = config::load_config(&dirs).unwrap();
    assert!(dirs.config_path().exists());
    assert_eq!(config.overlay.refresh_interval_secs, 5);
    assert!(config.overlay.show_graph);
    assert_eq!(config.api.base_url, BASE);
    assert_eq!(config.bridge.home_url, HOME);
    assert_eq!(
        config.playtime_path(&dirs.data_dir),
        dirs.data_dir.join("playtime.txt")
    );
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn user_edits_survive_a_second_load() {
    let root = scratch_dir("config_edits");
    let dirs = AppDirs {
        config_dir: root.join("config"),
        data_dir: root.join("data"),
    };
    config::load_config(&dirs).unwrap();

    std::fs::write(
        dirs.config_path(),
        "[player]\nusername = \"hikaru\"\n\n[overlay]\nshow_graph = false\n",
    )
    .unwrap();

    let config = config::load_config(&dirs).unwrap();
    assert_eq!(config.player.username, "hikaru");
    assert!(!config.overlay.show_graph);
    assert_eq!(config.overlay.refresh_interval_secs, 5, "omitted keys keep defaults");
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn invalid_user_config_is_rejected() {
    let root = scratch_dir("config_invalid");
    let dirs = AppDirs {
        config_dir: root.join("config"),
        data_dir: root.join("data"),
    };
    std::fs::create_dir_all(&dirs.config_dir).unwrap();
    std::fs::write(dirs.config_path(), "[overlay]\nrefresh_interval_secs = 0\n").unwrap();

    let err = config::load_config(&dirs).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError { .. }), "got {err:?}");
    let _ = std::fs::remove_dir_all(&root);
}

// ===========================================================================
// Stats -> overlay pipeline
// ===========================================================================

#[tokio::test]
async fn snapshot_uses_only_the_latest_archive() {
    let api = Arc::new(full_api());
    let aggregator = StatsAggregator::new(api.clone(), BASE);

    let snap = aggregator.snapshot("hikaru").await;
    assert_eq!(snap.ratings.blitz, Some(3150));
    assert_eq!(snap.recent_games.len(), 4);
    assert_eq!(snap.streak, 2);
    assert_eq!(snap.win_rate, Some(50.0));
    // Rating from hikaru's side of each game.
    assert_eq!(snap.rating_trend, vec![3100, 3110, 3120, 3150]);
    assert_eq!(api.request_count(), 3);
}

#[tokio::test]
async fn overlay_text_matches_snapshot() {
    let aggregator = StatsAggregator::new(Arc::new(full_api()), BASE);
    let snap = aggregator.snapshot("hikaru").await;
    let graph = sparkline::render(&snap.rating_trend, true);

    let text = format_overlay(&snap, &graph);
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("You ⚡3200  🔥3150  ⏳2900  🏆50.0%"));
    let sub = lines.next().unwrap();
    assert!(sub.starts_with("📊 ▁"), "got {sub}");
    assert!(sub.ends_with("   Streak: 🔥 2"), "got {sub}");
}

#[tokio::test]
async fn unknown_player_renders_neutral_overlay() {
    let page = ScriptedPage::at(HOME);
    let refresh = refresh_loop(page.clone(), Arc::new(CannedApi::default()));

    assert!(refresh.tick().await.unwrap());
    let scripts = page.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("N/A"));
    assert!(scripts[0].contains("Streak: 0"));
}

// ===========================================================================
// Session latch + refresh
// ===========================================================================

#[tokio::test]
async fn refresh_is_handed_out_once_then_keeps_running_off_play_page() {
    let page = ScriptedPage::at(HOME);
    let api = Arc::new(full_api());
    let mut observer = SessionObserver::new(
        page.clone(),
        ContextRules::default(),
        refresh_loop(page.clone(), api.clone()),
    );

    assert!(observer.tick().await.is_none(), "home page is not a game");
    assert!(!observer.refresh_started());

    page.go(PLAY);
    let refresh = observer.tick().await.expect("entering a game starts refresh");
    assert!(observer.state().in_target_context);

    page.go(HOME);
    assert!(observer.tick().await.is_none());
    page.go(PLAY);
    assert!(observer.tick().await.is_none(), "latch never re-arms");
    assert!(observer.refresh_started());

    // Still on the site but out of the game: the overlay keeps updating.
    page.go(HOME);
    assert!(refresh.tick().await.unwrap());
    let scripts = page.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains(CONTAINER_ID));

    page.go("https://example.org/");
    assert!(!refresh.tick().await.unwrap());
    assert_eq!(page.scripts().len(), 1);
}

// ===========================================================================
// Playtime
// ===========================================================================

#[tokio::test]
async fn playtime_accumulates_across_restarts() {
    let root = scratch_dir("playtime_restart");
    let path = root.join("playtime.txt");
    let page = ScriptedPage::at(PLAY);

    let mut acc = PlaytimeAccumulator::new(
        page.clone(),
        ContextRules::default(),
        PlaytimeLedger::load(&path),
    );
    for _ in 0..5 {
        acc.tick().await.unwrap();
    }
    page.go(HOME);
    acc.tick().await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "5");

    // Next session: a lost page connection counts as not playing.
    page.go(PLAY);
    let mut acc = PlaytimeAccumulator::new(
        page.clone(),
        ContextRules::default(),
        PlaytimeLedger::load(&path),
    );
    acc.tick().await.unwrap();
    acc.tick().await.unwrap();
    page.disconnect();
    acc.tick().await.unwrap();

    assert_eq!(PlaytimeLedger::load(&path).total_seconds(), 7);
    let _ = std::fs::remove_dir_all(&root);
}

// ===========================================================================
// WebSocket bridge
// ===========================================================================

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn wait_for_location(surface: &dyn Surface, expected: &str) {
    for _ in 0..100 {
        if surface.current_location().await.ok().as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("bridge never reported location {expected}");
}

#[tokio::test]
async fn bridge_round_trip_over_websocket() {
    let port = free_port();
    let (surface, handles) = bridge::channel();
    let (callback_tx, mut callback_rx) = mpsc::channel(4);
    let server = tokio::spawn(bridge::run(port, handles, callback_tx));

    assert!(matches!(
        surface.current_location().await,
        Err(SurfaceError::Disconnected)
    ));

    let url = format!("ws://127.0.0.1:{port}");
    let mut ws = None;
    for _ in 0..50 {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                ws = Some(stream);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut ws = ws.expect("bridge should accept connections");

    // Page reports its location.
    ws.send(Message::Text(
        json!({ "type": "location", "url": PLAY }).to_string().into(),
    ))
    .await
    .unwrap();
    wait_for_location(&surface, PLAY).await;

    // Engine pushes a script; the page receives it as a run_script frame.
    let script = navigation_script(HOME);
    surface.run_script(&script).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("script frame in time")
        .unwrap()
        .unwrap();
    let Message::Text(body) = frame else {
        panic!("expected a text frame, got {frame:?}");
    };
    let body: Value = serde_json::from_str(body.as_str()).unwrap();
    assert_eq!(body["type"], "run_script");
    assert_eq!(body["source"], script);

    // Overlay button press reaches the host.
    ws.send(Message::Text(
        json!({ "type": "callback", "name": "go_home" }).to_string().into(),
    ))
    .await
    .unwrap();
    let name = tokio::time::timeout(Duration::from_secs(2), callback_rx.recv())
        .await
        .expect("callback in time");
    assert_eq!(name.as_deref(), Some("go_home"));

    // Closing the page clears the location again.
    ws.close(None).await.unwrap();
    for _ in 0..100 {
        if surface.current_location().await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(matches!(
        surface.run_script("1").await,
        Err(SurfaceError::Disconnected)
    ));

    server.abort();
}
