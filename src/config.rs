//! Configuration management for plotgen
//!
//! Reads settings from ~/.config/plotgen/config.json. The file is
//! user-edited; plotgen never writes it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Anthropic API key; the ANTHROPIC_API_KEY environment variable takes precedence
    pub anthropic_api_key: Option<String>,
    /// Model used for pattern inference and script synthesis
    pub model: String,
    /// Max tokens requested per model reply
    pub max_tokens: u32,
    /// Attempt budget for model-driven pattern inference
    pub max_pattern_attempts: usize,
    /// Attempt budget for the synthesize/validate repair loop
    pub max_repair_attempts: usize,
    /// Wall-clock limit for a dry-run validation, in seconds
    pub validation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4000,
            max_pattern_attempts: 5,
            max_repair_attempts: 5,
            validation_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("plotgen"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        eprintln!(
                            "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Get the API key (environment variable wins over the config file)
    pub fn get_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.trim().is_empty() {
                return Some(key);
            }
        }
        self.anthropic_api_key.clone()
    }

    /// Validation timeout as a Duration
    pub fn validation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.validation_timeout_secs)
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/plotgen/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
