use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::provider::Provider;
use crate::state::ReplyFormat;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/chat";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:latest";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub embedding_model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub reply_format: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub embeddings_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Site.as_str().to_string()),
            endpoint: None,
            ollama_url: None,
            model: None,
            embedding_model: None,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            reply_format: Some(ReplyFormat::Structured.as_str().to_string()),
            catalog_path: None,
            embeddings_dir: None,
        }
    }

    /// Loads the user config, falling back to defaults when none exists,
    /// then applies environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// `VITRINA_ENDPOINT`, `VITRINA_MODEL` and `OLLAMA_HOST` win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("VITRINA_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(model) = lookup("VITRINA_MODEL") {
            self.model = Some(model);
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama_url = Some(host);
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Site)
    }

    pub fn reply_format(&self) -> ReplyFormat {
        self.reply_format
            .as_deref()
            .and_then(ReplyFormat::from_str)
            .unwrap_or_default()
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn embedding_model(&self) -> &str {
        self.embedding_model.as_deref().unwrap_or(DEFAULT_EMBEDDING_MODEL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }

    /// Embeddings directory: configured path, then `./data`, then the config dir.
    pub fn embeddings_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.embeddings_dir {
            return Some(dir.clone());
        }

        let local_path = PathBuf::from("data");
        if local_path.join("section_embeddings.npy").exists() {
            return Some(local_path);
        }

        dirs::config_dir()
            .map(|p| p.join("vitrina").join("data"))
            .filter(|p| p.join("section_embeddings.npy").exists())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("vitrina").join("config.json"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();

        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Site);
        assert_eq!(config.reply_format(), ReplyFormat::Structured);
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.provider = Some("ollama".to_string());
        config.model = Some("gemma3:latest".to_string());
        config.reply_format = Some("legacy".to_string());
        config.timeout_secs = Some(5);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.provider(), Provider::Ollama);
        assert_eq!(loaded.model(), "gemma3:latest");
        assert_eq!(loaded.reply_format(), ReplyFormat::Legacy);
        assert_eq!(loaded.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_and_unknown_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider": "carrier-pigeon", "reply_format": "xml", "timeout_secs": 0}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider(), Provider::Site);
        assert_eq!(config.reply_format(), ReplyFormat::Structured);
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.ollama_url(), DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::new();
        config.apply_overrides(|key| match key {
            "VITRINA_ENDPOINT" => Some("https://example.com/api/chat".to_string()),
            "OLLAMA_HOST" => Some("http://gpu-box:11434".to_string()),
            _ => None,
        });

        assert_eq!(config.endpoint(), "https://example.com/api/chat");
        assert_eq!(config.ollama_url(), "http://gpu-box:11434");
        assert_eq!(config.model(), DEFAULT_MODEL);
    }
}
