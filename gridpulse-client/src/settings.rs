//! Persisted client settings.
//!
//! The last-used endpoint URL survives restarts under the `websocket_url`
//! key. The store is injected so tests run against the in-memory
//! implementation; production uses a TOML file in the platform config
//! directory.

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

/// Key under which the last-used endpoint URL is persisted.
pub const ENDPOINT_KEY: &str = "websocket_url";

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Volatile store for tests and for running without a config directory.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.values.lock().insert(key.to_string(), value.to_string());
        store
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// TOML-backed store, one flat string map per file.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// OS-specific default location, e.g. `~/.config/gridpulse/settings.toml`.
    pub fn in_config_dir() -> Result<Self> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not find config directory"))?;
        path.push("gridpulse");
        path.push("settings.toml");
        Ok(Self::new(path))
    }

    fn load(&self) -> HashMap<String, String> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable settings file: {e}");
            HashMap::new()
        })
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.load();
        values.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(&values)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySettings::new();
        assert_eq!(store.get(ENDPOINT_KEY), None);
        store.set(ENDPOINT_KEY, "ws://feed.local:8080").unwrap();
        assert_eq!(
            store.get(ENDPOINT_KEY).as_deref(),
            Some("ws://feed.local:8080")
        );
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let store = FileSettings::new(&path);
        assert_eq!(store.get(ENDPOINT_KEY), None);
        store.set(ENDPOINT_KEY, "ws://feed.local:9000").unwrap();
        store.set("theme", "dark").unwrap();

        let reopened = FileSettings::new(&path);
        assert_eq!(
            reopened.get(ENDPOINT_KEY).as_deref(),
            Some("ws://feed.local:9000")
        );
        assert_eq!(reopened.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn file_store_tolerates_garbage_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "not { valid = toml").unwrap();

        let store = FileSettings::new(&path);
        assert_eq!(store.get(ENDPOINT_KEY), None);
        store.set(ENDPOINT_KEY, "ws://x:1").unwrap();
        assert_eq!(store.get(ENDPOINT_KEY).as_deref(), Some("ws://x:1"));
    }
}
