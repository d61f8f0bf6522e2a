use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn, error};
use uuid::Uuid;

use crate::ledger::PostLedger;
use crate::media::{MediaError, MediaFetcher};
use crate::models::{Platform, PlatformPostResult, PostRequest, PostStatus, PostedContent};
use crate::usage::UsageTracker;

/// Chunk size for APPEND calls.
pub const CHUNK_SIZE: usize = 1024 * 1024;
/// Wall-clock budget for the processing-status poll loop.
pub const PROCESSING_TIMEOUT: Duration = Duration::from_secs(60);
/// Poll interval when the platform does not recommend one.
pub const DEFAULT_POLL_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("INIT failed: {0}")]
    Init(String),
    #[error("APPEND failed for segment {segment}: {message}")]
    Append { segment: u32, message: String },
    #[error("FINALIZE failed: {0}")]
    Finalize(String),
    #[error("media processing failed: {0}")]
    ProcessingFailed(String),
    #[error("media processing timed out")]
    ProcessingTimeout,
    #[error("publish failed: status={status} {message}")]
    Publish { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("could not fetch media: {0}")]
    Media(#[from] MediaError),
    #[error("no posting route configured for {0}")]
    NoRoute(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[serde(alias = "pending")]
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingFault {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingInfo {
    pub state: ProcessingState,
    #[serde(default)]
    pub check_after_secs: Option<u64>,
    #[serde(default)]
    pub error: Option<ProcessingFault>,
}

#[cfg(test)]
impl ProcessingInfo {
    pub fn in_progress(check_after_secs: u64) -> Self {
        Self {
            state: ProcessingState::InProgress,
            check_after_secs: Some(check_after_secs),
            error: None,
        }
    }

    pub fn succeeded() -> Self {
        Self { state: ProcessingState::Succeeded, check_after_secs: None, error: None }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            state: ProcessingState::Failed,
            check_after_secs: None,
            error: Some(ProcessingFault { message: Some(message.to_string()), name: None }),
        }
    }
}

impl ProcessingInfo {
    fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|f| f.message.clone().or_else(|| f.name.clone()))
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// Transient bookkeeping for one chunked upload. Lives only as long as the
/// attempt; the platform's media id is the only identity that survives.
#[derive(Debug)]
pub struct UploadSession {
    pub media_id: String,
    pub total_bytes: u64,
    pub mime_type: String,
    pub segment_index: u32,
    pub processing_state: ProcessingState,
}

/// The platform-side chunked upload API: INIT, APPEND, FINALIZE, STATUS,
/// PUBLISH.
#[async_trait]
pub trait UploadPlatform: Send + Sync {
    async fn init(&self, total_bytes: u64, mime_type: &str) -> Result<String, PublishError>;
    async fn append(&self, media_id: &str, segment_index: u32, chunk: Bytes)
        -> Result<(), PublishError>;
    async fn finalize(&self, media_id: &str) -> Result<Option<ProcessingInfo>, PublishError>;
    async fn status(&self, media_id: &str) -> Result<Option<ProcessingInfo>, PublishError>;
    async fn publish(&self, text: &str, media_id: &str) -> Result<String, PublishError>;
}

pub fn split_chunks(payload: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(payload.len().div_ceil(chunk_size));
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        chunks.push(payload.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Run the full upload state machine for one video and publish the post:
/// INIT → APPEND* → FINALIZE → (STATUS poll)* → PUBLISH.
///
/// Chunks are uploaded strictly in order with zero-based segment indices;
/// any chunk failure is fatal to the whole attempt and the caller must
/// restart from INIT.
pub async fn upload_and_publish(
    platform: &dyn UploadPlatform,
    video: &Bytes,
    mime_type: &str,
    text: &str,
) -> Result<String, PublishError> {
    let total_bytes = video.len() as u64;
    info!("📤 INIT upload: {} bytes of {}", total_bytes, mime_type);
    let media_id = platform.init(total_bytes, mime_type).await?;

    let mut session = UploadSession {
        media_id,
        total_bytes,
        mime_type: mime_type.to_string(),
        segment_index: 0,
        processing_state: ProcessingState::InProgress,
    };

    for chunk in split_chunks(video, CHUNK_SIZE) {
        platform.append(&session.media_id, session.segment_index, chunk).await?;
        session.segment_index += 1;
    }
    info!("📤 Uploaded {} segments, finalizing", session.segment_index);

    let processing = platform.finalize(&session.media_id).await?;
    if let Some(initial) = processing {
        wait_for_processing(platform, &mut session, initial).await?;
    } else {
        session.processing_state = ProcessingState::Succeeded;
    }
    info!(
        "📤 Media {} ready: {} bytes of {}, state {:?}",
        session.media_id, session.total_bytes, session.mime_type, session.processing_state
    );

    let post_id = platform.publish(text, &session.media_id).await?;
    info!("✅ Published post {} (media {})", post_id, session.media_id);
    Ok(post_id)
}

/// Poll STATUS until the platform reports a terminal state, sleeping the
/// platform-recommended interval between polls, bounded by a wall-clock
/// budget.
async fn wait_for_processing(
    platform: &dyn UploadPlatform,
    session: &mut UploadSession,
    initial: ProcessingInfo,
) -> Result<(), PublishError> {
    let deadline = Instant::now() + PROCESSING_TIMEOUT;
    let mut info = initial;

    loop {
        session.processing_state = info.state;
        match info.state {
            ProcessingState::Succeeded => return Ok(()),
            ProcessingState::Failed => {
                return Err(PublishError::ProcessingFailed(info.error_message()));
            }
            ProcessingState::InProgress => {
                if Instant::now() >= deadline {
                    return Err(PublishError::ProcessingTimeout);
                }
                let wait = Duration::from_secs(info.check_after_secs.unwrap_or(DEFAULT_POLL_SECS));
                tokio::time::sleep(wait).await;

                info = match platform.status(&session.media_id).await? {
                    Some(next) => next,
                    // No status at all means processing is already done.
                    None => {
                        session.processing_state = ProcessingState::Succeeded;
                        return Ok(());
                    }
                };
            }
        }
    }
}

// --- Default REST platform client ---

#[derive(Debug, Clone)]
pub struct UploadApiConfig {
    pub upload_url: String,
    pub publish_url: String,
    pub bearer_token: Option<String>,
}

impl UploadApiConfig {
    pub fn from_env() -> Option<Self> {
        let upload_url = std::env::var("UPLOAD_API_URL").ok().filter(|v| !v.is_empty())?;
        let publish_url = std::env::var("PUBLISH_API_URL").ok().filter(|v| !v.is_empty())?;
        Some(Self {
            upload_url,
            publish_url,
            bearer_token: std::env::var("UPLOAD_API_TOKEN").ok().filter(|v| !v.is_empty()),
        })
    }
}

pub struct RestUploadClient {
    http: Client,
    config: UploadApiConfig,
}

impl RestUploadClient {
    pub fn new(config: UploadApiConfig) -> Self {
        Self { http: Client::new(), config }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct FinalizeResponse {
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    data: PublishData,
}

#[derive(Debug, Deserialize)]
struct PublishData {
    id: String,
}

#[async_trait]
impl UploadPlatform for RestUploadClient {
    async fn init(&self, total_bytes: u64, mime_type: &str) -> Result<String, PublishError> {
        let form = [
            ("command", "INIT".to_string()),
            ("media_type", mime_type.to_string()),
            ("media_category", "tweet_video".to_string()),
            ("total_bytes", total_bytes.to_string()),
        ];
        let response = self.request(self.http.post(&self.config.upload_url)).form(&form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Init(format!("{status} - {body}")));
        }

        let parsed: InitResponse =
            response.json().await.map_err(|e| PublishError::Init(e.to_string()))?;
        Ok(parsed.media_id_string)
    }

    async fn append(
        &self,
        media_id: &str,
        segment_index: u32,
        chunk: Bytes,
    ) -> Result<(), PublishError> {
        let form = reqwest::multipart::Form::new()
            .text("command", "APPEND")
            .text("media_id", media_id.to_string())
            .text("segment_index", segment_index.to_string())
            .part(
                "media",
                reqwest::multipart::Part::bytes(chunk.to_vec()).file_name("video.mp4"),
            );

        let response =
            self.request(self.http.post(&self.config.upload_url)).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Append {
                segment: segment_index,
                message: format!("{status} - {body}"),
            });
        }
        Ok(())
    }

    async fn finalize(&self, media_id: &str) -> Result<Option<ProcessingInfo>, PublishError> {
        let form = [("command", "FINALIZE".to_string()), ("media_id", media_id.to_string())];
        let response = self.request(self.http.post(&self.config.upload_url)).form(&form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Finalize(format!("{status} - {body}")));
        }

        let parsed: FinalizeResponse =
            response.json().await.map_err(|e| PublishError::Finalize(e.to_string()))?;
        Ok(parsed.processing_info)
    }

    async fn status(&self, media_id: &str) -> Result<Option<ProcessingInfo>, PublishError> {
        let response = self
            .request(self.http.get(&self.config.upload_url))
            .query(&[("command", "STATUS"), ("media_id", media_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::ProcessingFailed(format!("STATUS {status} - {body}")));
        }

        let parsed: FinalizeResponse = response
            .json()
            .await
            .map_err(|e| PublishError::ProcessingFailed(e.to_string()))?;
        Ok(parsed.processing_info)
    }

    async fn publish(&self, text: &str, media_id: &str) -> Result<String, PublishError> {
        let body = json!({ "text": text, "media": { "media_ids": [media_id] } });
        let response =
            self.request(self.http.post(&self.config.publish_url)).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Publish { status: status.as_u16(), message });
        }

        let parsed: PublishResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Publish { status: status.as_u16(), message: e.to_string() })?;
        Ok(parsed.data.id)
    }
}

// --- Multi-platform dispatch ---

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub make_webhook_url: Option<String>,
    pub pabbly_webhook_url: Option<String>,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        Self {
            make_webhook_url: std::env::var("MAKE_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            pabbly_webhook_url: std::env::var("PABBLY_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// Posts one piece of content to each selected platform, sequentially and
/// best-effort: one platform's failure never blocks the others. Every
/// attempt is recorded in the ledger before dispatch and resolved exactly
/// once afterwards.
pub struct Publisher {
    http: Client,
    webhooks: WebhookConfig,
    platform_api: Option<Arc<dyn UploadPlatform>>,
    media: MediaFetcher,
    ledger: Arc<PostLedger>,
    usage: Arc<UsageTracker>,
}

impl Publisher {
    pub fn new(
        webhooks: WebhookConfig,
        platform_api: Option<Arc<dyn UploadPlatform>>,
        media: MediaFetcher,
        ledger: Arc<PostLedger>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self { http: Client::new(), webhooks, platform_api, media, ledger, usage }
    }

    pub async fn post_to_platforms(&self, request: &PostRequest) -> Vec<PlatformPostResult> {
        let mut results = Vec::with_capacity(request.platforms.len());

        for platform in &request.platforms {
            let posted_id = self.ledger.record(build_record(request, *platform));

            match self.post_one(*platform, request).await {
                Ok(post_id) => {
                    self.ledger.update_status(posted_id, PostStatus::Posted).ok();
                    self.usage.record_post();
                    info!("✅ Posted to {}", platform.as_str());
                    results.push(PlatformPostResult {
                        platform: *platform,
                        posted_id,
                        status: PostStatus::Posted,
                        post_id,
                        message: None,
                    });
                }
                Err(e) => {
                    self.ledger.update_status(posted_id, PostStatus::Failed).ok();
                    error!("❌ Posting to {} failed: {e}", platform.as_str());
                    results.push(PlatformPostResult {
                        platform: *platform,
                        posted_id,
                        status: PostStatus::Failed,
                        post_id: None,
                        message: Some(e.to_string()),
                    });
                }
            }
        }

        results
    }

    async fn post_one(
        &self,
        platform: Platform,
        request: &PostRequest,
    ) -> Result<Option<String>, PublishError> {
        match platform {
            Platform::Instagram | Platform::Facebook => {
                self.dispatch_webhook(self.webhooks.make_webhook_url.as_deref(), platform, request)
                    .await
                    .map(|_| None)
            }
            Platform::Gmb => {
                self.dispatch_webhook(self.webhooks.pabbly_webhook_url.as_deref(), platform, request)
                    .await
                    .map(|_| None)
            }
            Platform::Twitter => {
                let api = self.platform_api.as_ref().ok_or(PublishError::NoRoute("twitter"))?;
                let video = self.media.fetch(&request.video_url).await?;
                let text = format!("{} {}", request.caption, request.hashtags).trim().to_string();
                upload_and_publish(api.as_ref(), &video.bytes, &video.mime_type, &text)
                    .await
                    .map(Some)
            }
            Platform::Tiktok => Err(PublishError::NoRoute("tiktok")),
        }
    }

    async fn dispatch_webhook(
        &self,
        url: Option<&str>,
        platform: Platform,
        request: &PostRequest,
    ) -> Result<(), PublishError> {
        let url = match url {
            Some(url) => url,
            None => {
                warn!("No webhook configured for {}", platform.as_str());
                return Err(PublishError::NoRoute(platform.as_str()));
            }
        };

        let payload = json!({
            "videoUrl": request.video_url,
            "caption": request.caption,
            "hashtags": request.hashtags,
            "platform": platform.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        let response = self.http.post(url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Publish { status: status.as_u16(), message });
        }
        Ok(())
    }
}

fn build_record(request: &PostRequest, platform: Platform) -> PostedContent {
    PostedContent {
        id: Uuid::new_v4(),
        user_id: request.user_id.clone(),
        generation_id: request.generation_id,
        cell_letter: request.cell_letter.clone(),
        image_url: request.image_url.clone(),
        caption: request.caption.clone(),
        hashtags: request.hashtags.split_whitespace().map(String::from).collect(),
        music_url: request.music_url.clone(),
        platform,
        status: PostStatus::Pending,
        posted_at: None,
        created_at: Utc::now(),
    }
}
