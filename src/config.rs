//! Configuration for xmpdp
//!
//! Loads configuration from TOML file at `~/.config/xmpdp/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mpd: MpdConfig,
    pub window: WindowConfig,
    pub text: TextConfig,
    pub keys: KeysConfig,
    pub update: UpdateConfig,
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. The default path is created with default
    /// values when missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let config_path = Self::config_path()?;
                if !config_path.exists() {
                    info!("Config file not found at {:?}, using defaults", config_path);
                    if let Err(e) = Self::save_default(&config_path) {
                        warn!("Failed to create default config file: {}", e);
                    }
                    Self::default()
                } else {
                    Self::read(&config_path)?
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {path:?}"))?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("xmpdp");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = Self::default().to_toml()?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Reject values the update engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.update.interval_ms == 0 {
            bail!("update.interval_ms must be greater than zero");
        }
        if self.update.max_draw_failures == 0 {
            bail!("update.max_draw_failures must be greater than zero");
        }
        if self.update.queue_depth == 0 {
            bail!("update.queue_depth must be greater than zero");
        }
        if self.mpd.timeout_ms == 0 {
            bail!("mpd.timeout_ms must be greater than zero");
        }
        if !self.window.use_root && (self.window.width == 0 || self.window.height == 0) {
            bail!("window size must be non-zero");
        }
        if self.text.font.trim().is_empty() {
            bail!("text.font must name a font");
        }
        Ok(())
    }
}

/// Where to reach the music daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpdConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Upper bound for one query (connect included)
    pub timeout_ms: u64,
}

impl MpdConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: xmpdp_mpd::DEFAULT_PORT,
            password: None,
            timeout_ms: 2000,
        }
    }
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border: u16,
    pub title: String,
    /// Draw on the root window instead of creating one
    pub use_root: bool,
    /// Background pixel (hex: 0xRRGGBB)
    pub background: u32,
    /// Text pixel (hex: 0xRRGGBB)
    pub foreground: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 500,
            height: 100,
            border: 10,
            title: "Xmpdp".to_string(),
            use_root: false,
            background: 0x000000,
            foreground: 0xffffff,
        }
    }
}

/// Which song field becomes the label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelField {
    /// The song URI
    #[default]
    File,
    /// Title tag, then stream name, then URI
    Title,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Core X font name
    pub font: String,
    /// Baseline origin of the text
    pub x: i16,
    pub y: i16,
    /// Shown when nothing is playing
    pub idle_text: String,
    pub field: LabelField,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font: "7x13".to_string(),
            x: 10,
            y: 20,
            idle_text: String::new(),
            field: LabelField::File,
        }
    }
}

/// Key codes (not keysyms) acted on in the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub quit: u8,
    pub refresh: u8,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            quit: 9,     // Escape
            refresh: 65, // space
        }
    }
}

/// When a scheduled cycle repaints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawPolicy {
    /// Only when the label changed or the last repaint failed
    #[default]
    OnChange,
    /// Every cycle
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub interval_ms: u64,
    pub policy: RedrawPolicy,
    /// Restart the interval after a refresh forced from the window
    pub reset_after_refresh: bool,
    /// Consecutive draw failures that end the program
    pub max_draw_failures: u32,
    /// Pending repaint requests before expose events get coalesced
    pub queue_depth: usize,
}

impl UpdateConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            policy: RedrawPolicy::OnChange,
            reset_after_refresh: false,
            max_draw_failures: 3,
            queue_depth: 16,
        }
    }
}
