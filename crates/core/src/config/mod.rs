use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub playback: PlaybackConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Reads a JSON config file. Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(?path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

/// Configuration specific to the playback synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Upper bound on a session before it is ended without a completion
    /// signal. Must exceed the longest content.
    pub failsafe_ms: u64,
    /// Start the session as soon as the surface mounts.
    pub auto_start: bool,
    /// Only messages from this origin are accepted.
    pub host_origin: String,
}

impl PlaybackConfig {
    pub fn failsafe(&self) -> Duration {
        Duration::from_millis(self.failsafe_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            // five minutes of content plus a minute of slack
            failsafe_ms: 360_000,
            auto_start: true,
            host_origin: "app://warmup".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "programs.json".to_string(),
        }
    }
}
