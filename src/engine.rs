// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP client for the local vision engine (Ollama API)

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::classify::{ScoredLabel, TaggingService};
use crate::config::EngineConfig;
use crate::{ImagoError, Result};

/// Maximum labels returned per image
const MAX_LABELS: usize = 5;

/// Vision engine API client
pub struct VisionClient {
    client: Client,
    base_url: String,
    retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl VisionClient {
    /// Create a new client from engine settings
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ImagoError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .url
            .trim_end_matches('/')
            .replace("/api/generate", "")
            .replace("/api/chat", "");

        Ok(Self {
            client,
            base_url,
            retries: config.retries,
        })
    }

    /// Check if the engine is reachable
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                ImagoError::EngineUnavailable(format!(
                    "Cannot connect to engine at {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Send an image plus prompt to a vision model
    pub async fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            images: Some(vec![image_base64.to_string()]),
        };

        debug!("Sending vision request: model={}", model);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(ImagoError::EngineUnavailable(format!(
                "Engine returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }

    /// Vision request with exponential-backoff retry
    pub async fn generate_with_retry(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                warn!("Retrying vision request in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            match self.generate_with_image(model, prompt, image_base64).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ImagoError::EngineUnavailable("Unknown error".to_string())))
    }
}

/// Resize and re-encode an image for the vision model, returning it
/// base64-encoded. Falls back to the raw bytes when decoding fails.
pub fn prepare_image(path: &Path) -> Result<String> {
    match image::open(path) {
        Ok(img) => {
            // Cap at 1024px on the longest side to keep requests small
            let img = if img.width() > 1024 || img.height() > 1024 {
                img.resize(1024, 1024, image::imageops::FilterType::Triangle)
            } else {
                img
            };

            let mut buffer = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut buffer);
            img.write_to(&mut cursor, image::ImageFormat::Jpeg)?;
            Ok(general_purpose::STANDARD.encode(&buffer))
        }
        Err(e) => {
            debug!("Decode failed for {:?} ({}), sending raw bytes", path, e);
            let data = std::fs::read(path)?;
            Ok(general_purpose::STANDARD.encode(&data))
        }
    }
}

const CLASSIFY_PROMPT: &str = "List up to 5 objects visible in this image, one per line, \
     each as '<label> <confidence>' where confidence is a number between 0 and 1. \
     Use short lowercase labels. Return ONLY the lines.";

/// Production classifier: prompts a local vision model and parses its
/// scored-label lines
pub struct VisionTagger {
    client: VisionClient,
    model: String,
}

impl VisionTagger {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            client: VisionClient::new(config)?,
            model: config.vision_model.clone(),
        })
    }

    pub fn client(&self) -> &VisionClient {
        &self.client
    }
}

#[async_trait]
impl TaggingService for VisionTagger {
    async fn classify(&self, path: &Path, threshold: f64) -> Result<Vec<ScoredLabel>> {
        let image_data = prepare_image(path)?;
        let response = self
            .client
            .generate_with_retry(&self.model, CLASSIFY_PROMPT, &image_data)
            .await?;
        Ok(parse_scored_labels(&response, threshold))
    }
}

/// Parse "<label> <confidence>" lines into labels sorted by descending
/// confidence, dropping malformed lines and anything below threshold
fn parse_scored_labels(response: &str, threshold: f64) -> Vec<ScoredLabel> {
    let mut labels: Vec<ScoredLabel> = response
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches('-').trim();
            let (label, score) = line.rsplit_once(|c: char| c == ' ' || c == ':' || c == ',')?;
            let confidence: f64 = score.trim().parse().ok()?;
            let label = label
                .trim()
                .trim_end_matches([':', ','])
                .trim_matches('"')
                .to_lowercase();
            if label.is_empty() || !(0.0..=1.0).contains(&confidence) {
                return None;
            }
            Some(ScoredLabel::new(label, confidence))
        })
        .filter(|l| l.confidence >= threshold)
        .collect();

    labels.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    labels.truncate(MAX_LABELS);
    labels
}
