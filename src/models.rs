use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::media::ReferenceImage;

/// Flat cost of one grid generation call, in dollars.
pub const GRID_COST: f64 = 0.05;
/// Cost of one single-cell regeneration call, in dollars.
pub const CELL_COST: f64 = 0.05;
/// The generation service accepts at most this many inline reference images.
pub const MAX_REFERENCE_IMAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Hair,
    Nail,
    Tattoo,
    Massage,
    Facial,
    Glow,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Hair => "hair",
            ServiceCategory::Nail => "nail",
            ServiceCategory::Tattoo => "tattoo",
            ServiceCategory::Massage => "massage",
            ServiceCategory::Facial => "facial",
            ServiceCategory::Glow => "glow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Gmb,
    Twitter,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Gmb => "gmb",
            Platform::Twitter => "twitter",
            Platform::Tiktok => "tiktok",
        }
    }
}

/// One request against the image generation service. Reference images are
/// clamped to the service maximum at construction.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub output_size: String,
    pub aspect_ratio: String,
    pub reference_images: Vec<ReferenceImage>,
}

impl GenerationRequest {
    pub fn new(prompt: String, model: String, mut reference_images: Vec<ReferenceImage>) -> Self {
        reference_images.truncate(MAX_REFERENCE_IMAGES);
        Self {
            prompt,
            model,
            output_size: "2K".to_string(),
            aspect_ratio: "1:1".to_string(),
            reference_images,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GridCell {
    pub letter: String,
    pub index: usize,
    pub is_selected: bool,
    pub prompt: String,
    pub result_url: Option<String>,
    pub status: CellStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Generation {
    pub id: Uuid,
    pub category_id: String,
    pub category_name: String,
    pub element_name: String,
    pub grid_url: String,
    pub cells: Vec<GridCell>,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostedContent {
    pub id: Uuid,
    pub user_id: String,
    pub generation_id: Option<Uuid>,
    pub cell_letter: Option<String>,
    pub image_url: Option<String>,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub music_url: Option<String>,
    pub platform: Platform,
    pub status: PostStatus,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSet {
    pub caption: String,
    pub hashtags: String,
}

/// One caption per target platform, produced in a single orchestrator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCaptions {
    pub instagram: CaptionSet,
    pub facebook: CaptionSet,
    pub gmb: CaptionSet,
    pub twitter: CaptionSet,
    pub tiktok: CaptionSet,
}

impl PlatformCaptions {
    pub fn uniform(set: CaptionSet) -> Self {
        Self {
            instagram: set.clone(),
            facebook: set.clone(),
            gmb: set.clone(),
            twitter: set.clone(),
            tiktok: set,
        }
    }
}

// --- Request / response bodies ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateGridRequest {
    pub user_id: String,
    pub category_id: String,
    #[serde(default)]
    pub category_name: Option<String>,
    pub element_name: String,
    /// Base prompt override; defaults to the category scene prompt.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Reference photo pool for the whole category.
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateGridResponse {
    pub generation: Option<Generation>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegenerateCellsRequest {
    pub user_id: String,
    /// Cell letters to regenerate, e.g. ["A", "C", "F"].
    pub cells: Vec<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptionRequest {
    pub user_id: String,
    pub image_url: String,
    pub service_type: ServiceCategory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateVideoRequest {
    pub user_id: String,
    pub image_url: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default = "default_video_duration")]
    pub duration_seconds: u32,
}

fn default_video_duration() -> u32 {
    15
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateVideoResponse {
    /// Playable data URL for the finished clip.
    pub video_url: Option<String>,
    pub mime_type: Option<String>,
    pub duration_seconds: Option<u32>,
    pub silent: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostRequest {
    pub user_id: String,
    pub video_url: String,
    pub caption: String,
    #[serde(default)]
    pub hashtags: String,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub generation_id: Option<Uuid>,
    #[serde(default)]
    pub cell_letter: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub music_url: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlatformPostResult {
    pub platform: Platform,
    pub posted_id: Uuid,
    pub status: PostStatus,
    pub post_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostResponse {
    pub results: Vec<PlatformPostResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdatePostStatusRequest {
    pub posted_id: Uuid,
    pub status: PostStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn generation_request_clamps_reference_images() {
        let refs = (0..14)
            .map(|_| ReferenceImage::new(vec![0u8; 4].into(), "image/png"))
            .collect();
        let req = GenerationRequest::new("p".into(), "m".into(), refs);
        assert_eq!(req.reference_images.len(), MAX_REFERENCE_IMAGES);
    }

    #[test]
    fn platform_serde_round_trip() {
        let json = serde_json::to_string(&Platform::Gmb).unwrap();
        assert_eq!(json, "\"gmb\"");
        let back: Platform = serde_json::from_str("\"twitter\"").unwrap();
        assert_eq!(back, Platform::Twitter);
    }

    #[test]
    fn service_category_parses_lowercase() {
        let cat: ServiceCategory = serde_json::from_str("\"facial\"").unwrap();
        assert_eq!(cat.as_str(), "facial");
    }
}
