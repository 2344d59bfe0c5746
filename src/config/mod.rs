// Configuration management for cloudpipe
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CLIENT_ID_ENV: &str = "SOUNDCLOUD_CLIENT_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub soundcloud: SoundCloudConfig,
    pub playback: PlaybackConfig,
    pub keys: KeyBindings,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundCloudConfig {
    pub client_id: Option<String>,
    pub api_base: String,
    pub search_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub seek_step_secs: u64,
    pub buffer_window_ms: u64,   // output window, also the renderer's chunk size
    pub progress_interval_ms: u64,
}

/// Single-character commands. Space and the arrow keys are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub quit: char,
    pub next: char,
    pub pause: char,
    pub search: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub random_keywords: Vec<String>,
}

impl Default for SoundCloudConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            api_base: "https://api-v2.soundcloud.com".to_string(),
            search_limit: 15,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            seek_step_secs: 30,
            buffer_window_ms: 100,
            progress_interval_ms: 1000,
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: 'q',
            next: 'n',
            pause: 'p',
            search: 's',
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            random_keywords: ["lofi", "hiphop", "ambient", "indie", "funk", "synthwave"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PlaybackConfig {
    pub fn seek_step(&self) -> Duration {
        Duration::from_secs(self.seek_step_secs)
    }

    pub fn buffer_window(&self) -> Duration {
        Duration::from_millis(self.buffer_window_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Read `path`, or write the defaults there if it does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Environment wins over the file for credentials.
    pub fn apply_env(&mut self) {
        self.apply_client_id(std::env::var(CLIENT_ID_ENV).ok());
    }

    fn apply_client_id(&mut self, value: Option<String>) {
        if let Some(id) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            self.soundcloud.client_id = Some(id);
        }
    }

    pub fn client_id(&self) -> Result<String> {
        self.soundcloud
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("{} is not set (environment, .env or config.toml)", CLIENT_ID_ENV))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("cloudpipe");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.playback.seek_step_secs, 30);
        assert_eq!(config.soundcloud.search_limit, 15);
        assert_eq!(config.keys, KeyBindings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[playback]\nseek_step_secs = 10\n\n[keys]\nquit = \"x\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.playback.seek_step(), Duration::from_secs(10));
        assert_eq!(config.playback.buffer_window(), Duration::from_millis(100));
        assert_eq!(config.keys.quit, 'x');
        assert_eq!(config.keys.next, 'n');
        assert_eq!(config.search.random_keywords.len(), 6);
    }

    #[test]
    fn test_env_client_id_overrides_file() {
        let mut config = Config::default();
        config.soundcloud.client_id = Some("from-file".to_string());

        config.apply_client_id(Some("  from-env ".to_string()));
        assert_eq!(config.client_id().unwrap(), "from-env");

        config.apply_client_id(Some(String::new()));
        assert_eq!(config.client_id().unwrap(), "from-env");
    }

    #[test]
    fn test_missing_client_id_is_error() {
        let config = Config::default();
        assert!(config.client_id().is_err());
    }
}
