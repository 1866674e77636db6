//! Runtime configuration.
//!
//! Loaded from an optional `config.toml`, then overridden by environment
//! variables (`USER_EMAIL`, `AIPROXY_TOKEN`, `OPENAI_API_BASE`).  Every
//! field has a default so the service starts with no configuration at all;
//! without an API token it runs in offline mode, where only the keyword
//! fallback classifier is available and the embeddings-backed operation
//! fails at dispatch time.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Account identity used when no `USER_EMAIL` is supplied.
pub const DEFAULT_USER_EMAIL: &str = "23f1002121@ds.study.iitm.ac.in";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account email identifying the data-generation target.
    #[serde(default = "Config::default_user_email")]
    pub user_email: String,
    /// Bearer token for the remote chat/embeddings endpoints.
    /// `None` disables the remote classifier path entirely.
    #[serde(default)]
    pub api_token: Option<String>,
    /// OpenAI-compatible API base URL.
    #[serde(default = "Config::default_api_base")]
    pub api_base: String,
    /// Model used for intent classification.
    #[serde(default = "Config::default_chat_model")]
    pub chat_model: String,
    /// Model used for comment embeddings.
    #[serde(default = "Config::default_embedding_model")]
    pub embedding_model: String,
    /// Root directory the canonical task phrasings refer to.
    #[serde(default = "Config::default_data_root")]
    pub data_root: String,
    /// Path to the external data-generation script.
    #[serde(default = "Config::default_datagen_script")]
    pub datagen_script: String,
}

impl Config {
    fn default_user_email() -> String {
        DEFAULT_USER_EMAIL.to_string()
    }

    fn default_api_base() -> String {
        "https://aiproxy.sanand.workers.dev/openai/v1".to_string()
    }

    fn default_chat_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_embedding_model() -> String {
        "text-embedding-3-small".to_string()
    }

    fn default_data_root() -> String {
        "/data".to_string()
    }

    fn default_datagen_script() -> String {
        "datagen.py".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_email: Self::default_user_email(),
            api_token: None,
            api_base: Self::default_api_base(),
            chat_model: Self::default_chat_model(),
            embedding_model: Self::default_embedding_model(),
            data_root: Self::default_data_root(),
            datagen_script: Self::default_datagen_script(),
        }
    }
}

impl Config {
    /// Load configuration from file, then apply environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home_dir.join(".taskhand").join("config.toml")
        };

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Environment variables win over file values.  Empty values are
    /// treated as unset.
    fn apply_env(&mut self) {
        if let Ok(email) = std::env::var("USER_EMAIL") {
            if !email.is_empty() {
                self.user_email = email;
            }
        }
        if let Ok(token) = std::env::var("AIPROXY_TOKEN") {
            if !token.is_empty() {
                self.api_token = Some(token);
            }
        }
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            if !base.is_empty() {
                self.api_base = base;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.user_email, DEFAULT_USER_EMAIL);
        assert!(config.api_token.is_none());
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.data_root, "/data");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(r#"user_email = "alice@example.com""#).unwrap();
        assert_eq!(config.user_email, "alice@example.com");
        assert_eq!(config.api_base, Config::default_api_base());
        assert_eq!(config.datagen_script, "datagen.py");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Some(PathBuf::from("/nonexistent/taskhand.toml"))).unwrap();
        assert_eq!(config.data_root, "/data");
    }
}
