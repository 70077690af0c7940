// Configuration loading and parsing (config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Contents written to `config.toml` the first time Rooko runs.
pub const DEFAULT_CONFIG: &str = include_str!("../defaults/config.toml");

pub const CONFIG_FILE_NAME: &str = "config.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },

    #[error("could not determine a home directory for config and data files")]
    NoHomeDir,
}

// ---------------------------------------------------------------------------
// config.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub player: PlayerConfig,
    pub overlay: OverlayConfig,
    pub playtime: PlaytimeConfig,
    pub context: ContextConfig,
    pub api: ApiConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub username: String,
    pub email: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            email: "example@example.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub show_graph: bool,
    pub refresh_interval_secs: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            show_graph: true,
            refresh_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaytimeConfig {
    pub file: String,
}

impl Default for PlaytimeConfig {
    fn default() -> Self {
        Self {
            file: "playtime.txt".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub play_marker: String,
    pub site_marker: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            play_marker: "chess.com/play".into(),
            site_marker: "chess.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.chess.com/pub".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub port: u16,
    pub home_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: 9011,
            home_url: "https://www.chess.com/home".into(),
        }
    }
}

impl Config {
    /// Ledger location; relative paths are taken from `data_dir`.
    pub fn playtime_path(&self, data_dir: &Path) -> PathBuf {
        let file = Path::new(&self.playtime.file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            data_dir.join(file)
        }
    }
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

/// Where Rooko keeps its config file and its data (ledger, logs).
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppDirs {
    /// Platform directories for the "Rooko" application.
    pub fn discover() -> Result<Self, ConfigError> {
        let dirs = directories::ProjectDirs::from("", "", "Rooko").ok_or(ConfigError::NoHomeDir)?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Create `config.toml` in `config_dir` from [`DEFAULT_CONFIG`] unless one is
/// already there. Returns the path when a file was written.
pub fn ensure_config_file(config_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let target = config_dir.join(CONFIG_FILE_NAME);
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            std::io::Write::write_all(&mut dest, DEFAULT_CONFIG.as_bytes()).map_err(|e| {
                ConfigError::DefaultsCopyError {
                    message: format!("failed to write {}: {e}", target.display()),
                }
            })?;
            Ok(Some(target))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", target.display()),
        }),
    }
}

/// Parse and validate config text. `path` is only used for error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Load and validate a config file without creating defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    parse_config(&text, path)
}

/// Convenience wrapper: bootstraps the default file if needed, then loads it.
pub fn load_config(dirs: &AppDirs) -> Result<Config, ConfigError> {
    ensure_config_file(&dirs.config_dir)?;
    load_config_from(&dirs.config_path())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let positive: &[(&str, u64)] = &[
        ("overlay.refresh_interval_secs", config.overlay.refresh_interval_secs),
        ("api.timeout_secs", config.api.timeout_secs),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if config.bridge.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "bridge.port".into(),
            message: "must be a fixed port, got 0".into(),
        });
    }

    let non_empty: &[(&str, &str)] = &[
        ("context.play_marker", config.context.play_marker.as_str()),
        ("context.site_marker", config.context.site_marker.as_str()),
        ("api.base_url", config.api.base_url.as_str()),
        ("playtime.file", config.playtime.file.as_str()),
    ];
    for (name, val) in non_empty {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
