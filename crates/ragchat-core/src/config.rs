//! Configuration management.
//!
//! Persists relay URLs, the provider key, and chat settings to
//! `~/.ragchat/config.json`. Every field has a default, so the assistant runs
//! out of the box without a config file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_relays() -> Vec<String> {
    vec!["wss://openagents.forkforge.net:7777".to_string()]
}

fn default_provider() -> String {
    // Public pool provider; used when encryption is toggled on.
    "a6caebb39caea156dc031b1c56d336f9a053ea69de2a654a0f4181d7047bfc7d".to_string()
}

fn default_documents() -> Vec<String> {
    vec!["https://wiki.jmonkeyengine.org/sitemap.xml".to_string()]
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_plugin_url() -> String {
    "https://github.com/OpenAgentsInc/openagents-rag-coordinator-plugin/releases/download/v0.2/rag.wasm"
        .to_string()
}

fn default_runtime() -> String {
    "openagents/extism-runtime".to_string()
}

/// Persistent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relay endpoints the job dispatcher publishes to and subscribes on.
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,
    /// Provider public key (x-only hex) used when encryption is enabled.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Document URLs handed to the retrieval job as passages.
    #[serde(default = "default_documents")]
    pub documents: Vec<String>,
    /// Chat-completion model.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Retrieval plugin the provider should run.
    #[serde(default = "default_plugin_url")]
    pub plugin_url: String,
    /// Runtime the job should be scheduled on.
    #[serde(default = "default_runtime")]
    pub runtime: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            provider: default_provider(),
            documents: default_documents(),
            model: default_model(),
            api_base: default_api_base(),
            plugin_url: default_plugin_url(),
            runtime: default_runtime(),
        }
    }
}

impl Config {
    /// Path to the config directory: `~/.ragchat/`.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".ragchat"))
    }

    /// Path to the config file: `~/.ragchat/config.json`.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk. Returns defaults if the file is missing or invalid.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Load from an explicit path; defaults when missing or invalid.
    pub fn load_from(path: &std::path::Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to disk.
    pub fn save(&self) -> crate::error::Result<()> {
        let dir = Self::config_dir()
            .ok_or_else(|| crate::error::Error::Config("cannot determine home directory".into()))?;
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join("config.json"), json)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = Config::default();
        assert_eq!(cfg.relays.len(), 1);
        assert!(cfg.relays[0].starts_with("wss://"));
        assert_eq!(cfg.provider.len(), 64);
        assert!(!cfg.documents.is_empty());
        assert_eq!(cfg.model, "gpt-3.5-turbo");
    }

    #[test]
    fn roundtrip_json() {
        let cfg = Config {
            relays: vec!["wss://relay.test:7777".into()],
            model: "gpt-4o-mini".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.relays, cfg.relays);
        assert_eq!(loaded.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let loaded: Config = serde_json::from_str(r#"{"model":"gpt-4"}"#).unwrap();
        assert_eq!(loaded.model, "gpt-4");
        assert_eq!(loaded.relays, default_relays());
        assert_eq!(loaded.provider, default_provider());
    }

    #[test]
    fn load_from_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.json"));
        assert_eq!(cfg.model, "gpt-3.5-turbo");
    }

    #[test]
    fn load_from_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{broken").unwrap();
        let cfg = Config::load_from(&path);
        assert_eq!(cfg.relays, default_relays());
    }

    #[test]
    fn config_path_contains_ragchat() {
        if let Some(path) = Config::config_path() {
            assert!(path.to_string_lossy().contains(".ragchat"));
            assert!(path.to_string_lossy().contains("config.json"));
        }
    }
}
