use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, error};

use crate::media::ReferenceImage;
use crate::models::GenerationRequest;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("HTTP error: status={status} body={body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no image data in response")]
    NoImage,
    #[error("no text content in response")]
    NoText,
}

impl GeminiError {
    /// Rate-limit / quota exhaustion detection, used by the caption
    /// circuit-breaker.
    pub fn is_quota_error(&self) -> bool {
        match self {
            GeminiError::Http { status: 429, .. } => true,
            GeminiError::Http { body, .. } => {
                let body = body.to_lowercase();
                body.contains("quota") || body.contains("rate_limit") || body.contains("overloaded")
            }
            _ => false,
        }
    }
}

/// The image generation service the grid orchestrators depend on.
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GeminiError>;
}

/// The vision/text service the caption orchestrator depends on.
#[async_trait]
pub trait CaptionModel: Send + Sync {
    async fn caption(&self, image: &ReferenceImage, prompt: &str) -> Result<String, GeminiError>;
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Fetchable result reference; inline service output is surfaced as a
    /// data URL.
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub image_model: String,
    pub caption_model: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            image_model: std::env::var("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-image-preview".to_string()),
            caption_model: std::env::var("GEMINI_CAPTION_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        }
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    pub fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> Result<String, GeminiError> {
        let key = self.config.api_key.as_deref().ok_or(GeminiError::MissingCredential)?;
        Ok(format!("{}/models/{}:generateContent?key={}", self.config.base_url, model, key))
    }

    async fn perform_api_call(
        &self,
        model: &str,
        parts: Vec<serde_json::Value>,
        generation_config: serde_json::Value,
    ) -> Result<GeminiResponse, GeminiError> {
        let url = self.endpoint(model)?;
        let request_body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": generation_config,
        });

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut redacted = request_body.clone();
            truncate_base64_in_json(&mut redacted);
            tracing::debug!("📤 Request body: {}", serde_json::to_string(&redacted).unwrap_or_default());
        }

        let response = self.client.post(&url).json(&request_body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ API error response: status={} {}", status, body);
            return Err(GeminiError::Http { status: status.as_u16(), body });
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| GeminiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ImageService for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GeminiError> {
        info!(
            "🖼️ Generating image with {} ({} reference photos)",
            request.model,
            request.reference_images.len()
        );

        let mut parts: Vec<serde_json::Value> = request
            .reference_images
            .iter()
            .map(|image| {
                json!({
                    "inline_data": { "mime_type": image.mime_type, "data": image.to_base64() }
                })
            })
            .collect();
        parts.push(json!({ "text": request.prompt }));

        let parsed = self
            .perform_api_call(
                &request.model,
                parts,
                json!({
                    "responseModalities": ["TEXT", "IMAGE"],
                    "temperature": 0.4,
                    "topP": 0.95,
                    "topK": 64,
                    "candidateCount": 1,
                    "imageConfig": {
                        "aspectRatio": request.aspect_ratio,
                        "imageSize": request.output_size,
                    },
                }),
            )
            .await?;

        let (mime_type, data) = extract_first_image_b64(&parsed).ok_or(GeminiError::NoImage)?;
        info!("✅ Generated {} image ({} chars base64)", mime_type, data.len());
        Ok(GeneratedImage { url: format!("data:{mime_type};base64,{data}") })
    }
}

#[async_trait]
impl CaptionModel for GeminiClient {
    async fn caption(&self, image: &ReferenceImage, prompt: &str) -> Result<String, GeminiError> {
        let parts = vec![
            json!({ "inline_data": { "mime_type": image.mime_type, "data": image.to_base64() } }),
            json!({ "text": prompt }),
        ];

        let parsed = self
            .perform_api_call(
                &self.config.caption_model,
                parts,
                json!({ "temperature": 0.7, "maxOutputTokens": 256 }),
            )
            .await?;

        extract_first_text(&parsed).ok_or(GeminiError::NoText)
    }
}

// Truncate base64 payloads so request/response logging stays readable.
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 {
                            *val = serde_json::Value::String(format!(
                                "{}...[truncated {} chars]",
                                &s[..50],
                                s.len() - 50
                            ));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

// --- Response parsing helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: String,
}

fn extract_first_image_b64(resp: &GeminiResponse) -> Option<(String, String)> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                return Some((inline_data.mime_type.clone(), inline_data.data.clone()));
            }
        }
    }
    None
}

fn extract_first_text(resp: &GeminiResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Text { text } = p {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_inline_image_from_response() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [
                    { "text": "here is your image" },
                    { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
                ]}
            }]
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let (mime, data) = extract_first_image_b64(&parsed).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, "QUJD");
        assert_eq!(extract_first_text(&parsed).unwrap(), "here is your image");
    }

    #[test]
    fn quota_errors_are_detected() {
        assert!(GeminiError::Http { status: 429, body: String::new() }.is_quota_error());
        assert!(GeminiError::Http { status: 400, body: "Quota exceeded for model".into() }
            .is_quota_error());
        assert!(!GeminiError::Http { status: 500, body: "internal".into() }.is_quota_error());
        assert!(!GeminiError::NoImage.is_quota_error());
    }

    #[test]
    fn missing_credential_detected_before_any_call() {
        let client = GeminiClient::new(GeminiConfig {
            api_key: None,
            base_url: "http://localhost".into(),
            image_model: "m".into(),
            caption_model: "m".into(),
        });
        assert!(!client.has_credential());
        assert!(matches!(client.endpoint("m"), Err(GeminiError::MissingCredential)));
    }

    #[test]
    fn base64_truncation_keeps_logs_short() {
        let mut value = json!({ "inline_data": { "data": "A".repeat(300) } });
        truncate_base64_in_json(&mut value);
        let s = value["inline_data"]["data"].as_str().unwrap();
        assert!(s.len() < 100);
        assert!(s.contains("truncated"));
    }
}
