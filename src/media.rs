use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("fetch failed: status={0}")]
    Status(reqwest::StatusCode),
}

/// A media payload normalized to raw bytes plus a MIME type, ready for the
/// generation service or a chunked upload.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(bytes: Bytes, mime_type: impl Into<String>) -> Self {
        Self { bytes, mime_type: mime_type.into() }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Resolves embedded-data and remote references into raw bytes.
#[derive(Debug, Clone, Default)]
pub struct MediaFetcher {
    http: Client,
}

impl MediaFetcher {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    pub async fn fetch(&self, reference: &str) -> Result<ReferenceImage, MediaError> {
        if reference.starts_with("data:") {
            return decode_data_url(reference);
        }

        let response = self.http.get(reference).send().await?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status()));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?;
        let mime_type = resolve_mime(header_mime, &bytes);

        debug!("fetched {} bytes ({}) from remote reference", bytes.len(), mime_type);
        Ok(ReferenceImage::new(bytes, mime_type))
    }
}

fn decode_data_url(reference: &str) -> Result<ReferenceImage, MediaError> {
    let body = &reference["data:".len()..];
    let (header, data) = body
        .split_once(',')
        .ok_or_else(|| MediaError::InvalidDataUrl("missing comma separator".into()))?;

    let mime_type = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();

    if !header.ends_with(";base64") {
        return Err(MediaError::InvalidDataUrl("only base64 data URLs are supported".into()));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| MediaError::InvalidDataUrl(e.to_string()))?;

    Ok(ReferenceImage::new(bytes.into(), mime_type))
}

// Header wins when present and specific; otherwise sniff image bytes.
fn resolve_mime(header: Option<String>, bytes: &[u8]) -> String {
    match header {
        Some(m) if m != "application/octet-stream" && !m.is_empty() => m,
        _ => match image::guess_format(bytes) {
            Ok(format) => format.to_mime_type().to_string(),
            Err(_) => "application/octet-stream".to_string(),
        },
    }
}
