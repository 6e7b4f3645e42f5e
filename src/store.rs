//! Channel collection persistence
//!
//! Load priority: stored collection, then the remote seed document, then the
//! built-in lineup. The whole collection is the unit of persistence.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;

use crate::defaults::default_channels;
use crate::models::Channel;
use crate::storage::LocalStorage;

/// Versioned storage key for the channel collection
pub const CHANNELS_KEY: &str = "tvdeck_channels_v1";

#[derive(Debug)]
pub enum StoreError {
    Serialize(String),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Serialize(e) => write!(f, "Failed to serialize channels: {}", e),
            StoreError::Io(e) => write!(f, "Failed to write channels: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Where first-run channel data comes from
pub trait SeedSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Fetches the seed document over HTTP(S)
pub struct HttpSeed {
    agent: ureq::Agent,
}

impl HttpSeed {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(20)))
            .timeout_connect(Some(Duration::from_secs(10)))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for HttpSeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedSource for HttpSeed {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let mut response = self
            .agent
            .get(url)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| format!("Request failed: {}", e))?;

        if response.status() != 200 {
            return Err(format!("HTTP error: {}", response.status()));
        }

        response
            .body_mut()
            .read_to_vec()
            .map_err(|e| format!("Read failed: {}", e))
    }
}

/// Parse a seed document, transparently un-gzipping it
pub fn decode_seed(bytes: &[u8]) -> Result<Vec<Channel>, String> {
    let is_gzip = bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b;
    if is_gzip {
        let mut text = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut text)
            .map_err(|e| format!("Gzip decode failed: {}", e))?;
        serde_json::from_str(&text).map_err(|e| format!("Invalid seed JSON: {}", e))
    } else {
        serde_json::from_slice(bytes).map_err(|e| format!("Invalid seed JSON: {}", e))
    }
}

pub struct ChannelStore {
    storage: LocalStorage,
    seed_url: String,
    seed: Box<dyn SeedSource>,
}

impl ChannelStore {
    pub fn new(storage: LocalStorage, seed_url: &str) -> Self {
        Self::with_seed(storage, seed_url, Box::new(HttpSeed::new()))
    }

    pub fn with_seed(storage: LocalStorage, seed_url: &str, seed: Box<dyn SeedSource>) -> Self {
        Self {
            storage,
            seed_url: seed_url.trim().to_string(),
            seed,
        }
    }

    /// Load the collection, falling through storage -> seed -> defaults
    pub fn load(&self) -> Vec<Channel> {
        if let Some(raw) = self.storage.get(CHANNELS_KEY) {
            match serde_json::from_str::<Vec<Channel>>(&raw) {
                Ok(channels) => {
                    tracing::debug!("Loaded {} channels from storage", channels.len());
                    return channels;
                }
                Err(e) => tracing::warn!("Stored channels are corrupt, reseeding: {}", e),
            }
        }

        if !self.seed_url.is_empty() {
            match self.seed.fetch(&self.seed_url).and_then(|bytes| decode_seed(&bytes)) {
                Ok(channels) => {
                    tracing::info!("Seeded {} channels from {}", channels.len(), self.seed_url);
                    return channels;
                }
                Err(e) => tracing::warn!("Seed fetch from {} failed: {}", self.seed_url, e),
            }
        }

        tracing::info!("Using built-in channel lineup");
        default_channels()
    }

    /// Overwrite the persisted collection
    pub fn save_all(&self, channels: &[Channel]) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(channels).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.storage.set(CHANNELS_KEY, &payload).map_err(StoreError::Io)
    }
}
