// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Imago

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Default directory scanned when none is given on the command line
    #[serde(default = "default_source")]
    pub default_source: String,

    /// Base directory committed plans are materialized into
    #[serde(default = "default_dest")]
    pub default_dest: String,

    /// Path of the portable image catalog (JSON)
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Classifier confidence threshold (0.0 - 1.0)
    #[serde(default = "default_threshold")]
    pub ai_threshold: f64,

    /// Vision engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Scan settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Tag index settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Extension allow-list, matched case-insensitively
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Recurse into subdirectories by default
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Write merged AI tags back into the catalog during a scan
    #[serde(default = "default_true")]
    pub write_through: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_source() -> String { "./images".to_string() }
fn default_dest() -> String { "./organized".to_string() }
fn default_catalog_path() -> String { "imago_catalog.json".to_string() }
fn default_threshold() -> f64 { 0.5 }
fn default_engine_url() -> String { "http://localhost:11434".to_string() }
fn default_vision_model() -> String { "moondream".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_retries() -> u32 { 3 }
fn default_true() -> bool { true }
fn default_db_path() -> String { "imago.db".to_string() }

fn default_extensions() -> Vec<String> {
    vec!["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            vision_model: default_vision_model(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            recursive: true,
            write_through: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_source: default_source(),
            default_dest: default_dest(),
            catalog_path: default_catalog_path(),
            ai_threshold: default_threshold(),
            engine: EngineConfig::default(),
            scan: ScanConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::ImagoError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Threshold clamped to the valid range
    pub fn threshold(&self) -> f64 {
        self.ai_threshold.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.ai_threshold, 0.5);
        assert!(config.scan.recursive);
        assert!(config.scan.extensions.contains(&"jpg".to_string()));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"ai_threshold": 0.25}"#).unwrap();
        assert_eq!(config.ai_threshold, 0.25);
        assert_eq!(config.engine.vision_model, "moondream");
        assert_eq!(config.database.path, "imago.db");
    }

    #[test]
    fn threshold_is_clamped() {
        let config: AppConfig = serde_json::from_str(r#"{"ai_threshold": 7.0}"#).unwrap();
        assert_eq!(config.threshold(), 1.0);
    }
}
