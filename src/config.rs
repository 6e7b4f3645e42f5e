//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const APP_DIR: &str = "tvdeck";

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Which media element plays channels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum PlayerMode {
    #[default]
    Internal,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_seed_url")]
    pub seed_url: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    // Voice assistant
    #[serde(default)]
    pub voice_api_key: String,
    #[serde(default = "default_voice_model")]
    pub voice_model: String,
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    // Player
    #[serde(default)]
    pub player_mode: PlayerMode,
    #[serde(default = "default_external_player")]
    pub external_player: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    // Appearance
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    // Saved state
    #[serde(default)]
    pub last_channel_id: Option<String>,
}

fn default_seed_url() -> String { String::new() }
fn default_admin_password() -> String { "admin123".to_string() }
fn default_voice_model() -> String { "models/gemini-2.0-flash-live-001".to_string() }
fn default_voice_name() -> String { "Puck".to_string() }
fn default_external_player() -> String { "mpv".to_string() }
fn default_volume() -> f32 { 1.0 }
fn default_font_size() -> u32 { 14 }
fn default_true() -> bool { true }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            seed_url: default_seed_url(),
            admin_password: default_admin_password(),
            voice_api_key: String::new(),
            voice_model: default_voice_model(),
            voice_name: default_voice_name(),
            player_mode: PlayerMode::default(),
            external_player: default_external_player(),
            volume: default_volume(),
            dark_mode: true,
            font_size: default_font_size(),
            last_channel_id: None,
        }
    }
}

/// Per-user application directory, created on demand
pub fn app_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    fs::create_dir_all(&path).ok();
    path
}

impl AppConfig {
    fn config_path() -> PathBuf {
        app_dir().join("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &std::path::Path) {
        if let Ok(content) = serde_json::to_string_pretty(self) {
            if let Err(e) = fs::write(path, content) {
                tracing::warn!("Failed to save config to {}: {}", path.display(), e);
            }
        }
    }

    /// Configured key, falling back to the environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key_from(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_from(&self, env: Option<String>) -> Option<String> {
        if !self.voice_api_key.trim().is_empty() {
            return Some(self.voice_api_key.trim().to_string());
        }
        env.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
    }
}
