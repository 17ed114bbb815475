//! Gemini vision client.
//!
//! Calls `POST {base}/v1beta/models/{model}:generateContent` with the prompt
//! and the image as inline base64 data. The API key is read from
//! `GEMINI_API_KEY`.
//!
//! Each [`VisionService::analyze`] call is one HTTP attempt; the
//! reprocessing coordinator owns the retry loop. Failures are mapped onto
//! [`VisionError`]:
//!
//! | Outcome | Error |
//! |---------|-------|
//! | 429, 5xx, timeout, connection error | `Transient` |
//! | 401, 403 | `Auth` |
//! | other 4xx | `Rejected` |
//! | 2xx without candidate text | `Malformed` |

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;

use smartdoc_core::vision::{VisionError, VisionService};

use crate::config::VisionConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiVision {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl GeminiVision {
    pub fn new(config: &VisionConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Used when vision is disabled or no API key is available. Every call
/// fails with [`VisionError::Disabled`], which is not retried.
pub struct DisabledVision;

#[async_trait]
impl VisionService for DisabledVision {
    async fn analyze(&self, _image: &[u8], _prompt: &str) -> Result<String, VisionError> {
        Err(VisionError::Disabled)
    }
}

/// Build the configured vision service.
pub fn create_vision(config: &VisionConfig) -> Result<Box<dyn VisionService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledVision)),
        "gemini" => match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Box::new(GeminiVision::new(config, key)?)),
            _ => {
                tracing::warn!("GEMINI_API_KEY not set; schematic reprocessing is disabled");
                Ok(Box::new(DisabledVision))
            }
        },
        other => Err(anyhow!("Unknown vision provider: {}", other)),
    }
}

/// Best-effort MIME type from magic bytes. Defaults to PNG.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

fn request_body(prompt: &str, image: &[u8], temperature: f64) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                {
                    "inline_data": {
                        "mime_type": sniff_mime(image),
                        "data": STANDARD.encode(image),
                    }
                }
            ]
        }],
        "generationConfig": {
            "temperature": temperature,
        }
    })
}

/// Concatenate the text parts of the first candidate.
fn parse_response(json: &serde_json::Value) -> Result<String, VisionError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| VisionError::Malformed("missing candidates[0].content.parts".into()))?;

    let text: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    let text = text.join("\n");

    if text.trim().is_empty() {
        return Err(VisionError::Malformed("response contained no text".into()));
    }
    Ok(text)
}

fn classify_status(status: reqwest::StatusCode, body: String) -> VisionError {
    let message = format!("Gemini API error {}: {}", status, body);
    match status.as_u16() {
        429 => VisionError::Transient(message),
        401 | 403 => VisionError::Auth(message),
        _ if status.is_server_error() => VisionError::Transient(message),
        _ => VisionError::Rejected(message),
    }
}

#[async_trait]
impl VisionService for GeminiVision {
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, VisionError> {
        let body = request_body(prompt, image, self.temperature);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Transient(format!("Gemini connection error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VisionError::Malformed(format!("invalid JSON: {}", e)))?;
        parse_response(&json)
    }
}
