use axum::{Json, extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}};
use std::{collections::HashMap, sync::Arc};
use parking_lot::RwLock;
use serde_json::json;
use uuid::Uuid;

use crate::captions::CaptionGenerator;
use crate::gemini::GeminiClient;
use crate::grid;
use crate::ledger::PostLedger;
use crate::media::MediaFetcher;
use crate::models::{
    CaptionRequest, CreateVideoRequest, CreateVideoResponse, GenerateGridRequest,
    GenerateGridResponse, Generation, PlatformCaptions, PostRequest, PostResponse,
    PostedContent, RegenerateCellsRequest, UpdatePostStatusRequest,
};
use crate::publish::Publisher;
use crate::usage::{UsageSnapshot, UsageTracker};
use crate::video::VideoAssembler;

#[derive(Clone)]
pub struct AppState {
    pub generations: Arc<RwLock<HashMap<Uuid, Generation>>>,
    pub gemini: Arc<GeminiClient>,
    pub image_model: String,
    pub media: MediaFetcher,
    pub captions: Arc<CaptionGenerator>,
    pub video: Arc<VideoAssembler>,
    pub publisher: Arc<Publisher>,
    pub ledger: Arc<PostLedger>,
    pub usage: Arc<UsageTracker>,
}

/// Generate a fresh 4x4 grid for an element. Responds 200 with either the
/// new generation or a user-displayable error message.
pub async fn generate_grid(
    State(state): State<AppState>,
    Json(body): Json<GenerateGridRequest>,
) -> Json<GenerateGridResponse> {
    tracing::info!(
        "🚀 Grid generation requested by {} for element '{}'",
        body.user_id,
        body.element_name
    );

    match grid::generate_grid(
        state.gemini.as_ref(),
        &state.media,
        &state.usage,
        &state.image_model,
        &body,
    )
    .await
    {
        Ok(generation) => {
            state.generations.write().insert(generation.id, generation.clone());
            Json(GenerateGridResponse { generation: Some(generation), error: None })
        }
        Err(e) => {
            tracing::error!("❌ Grid generation failed: {e}");
            Json(GenerateGridResponse { generation: None, error: Some(e.to_string()) })
        }
    }
}

pub async fn get_generation(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    if let Some(generation) = state.generations.read().get(&id).cloned() {
        Json(generation).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

pub async fn list_generations(State(state): State<AppState>) -> Json<Vec<Generation>> {
    let mut generations: Vec<Generation> = state.generations.read().values().cloned().collect();
    generations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(generations)
}

/// Regenerate the selected cells of an existing generation, sequentially and
/// best-effort per cell. Returns the updated generation.
pub async fn regenerate_cells(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<RegenerateCellsRequest>,
) -> Result<Json<Generation>, StatusCode> {
    // Clone out so no lock is held across the generation calls.
    let mut generation = state
        .generations
        .read()
        .get(&id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)?;

    tracing::info!("🎯 Regenerating {} cells of generation {}", body.cells.len(), id);

    grid::regenerate_selected_cells(
        state.gemini.as_ref(),
        &state.media,
        &state.usage,
        &state.image_model,
        &mut generation,
        &body.cells,
        &body.photo_urls,
    )
    .await;

    state.generations.write().insert(id, generation.clone());
    Ok(Json(generation))
}

/// Auto-captions for every platform at once. Never fails: every error path
/// degrades to the category's canned caption set.
pub async fn generate_captions(
    State(state): State<AppState>,
    Json(body): Json<CaptionRequest>,
) -> Json<PlatformCaptions> {
    let captions = state.captions.generate_for_platforms(&body.image_url, body.service_type).await;
    Json(captions)
}

pub async fn create_video(
    State(state): State<AppState>,
    Json(body): Json<CreateVideoRequest>,
) -> Json<CreateVideoResponse> {
    let result = state
        .video
        .assemble(
            &body.image_url,
            body.audio_url.as_deref(),
            body.duration_seconds,
            |progress, stage| tracing::info!("🎞️ {stage} ({progress}%)"),
        )
        .await;

    match result {
        Ok(video) => Json(CreateVideoResponse {
            video_url: Some(video.to_data_url()),
            mime_type: Some(video.mime_type.clone()),
            duration_seconds: Some(video.duration_seconds),
            silent: Some(video.silent),
            error: None,
        }),
        Err(e) => {
            tracing::error!("❌ Video assembly failed: {e}");
            Json(CreateVideoResponse {
                video_url: None,
                mime_type: None,
                duration_seconds: None,
                silent: None,
                error: Some(e.to_string()),
            })
        }
    }
}

/// Post a finished video to every selected platform, sequentially; each
/// platform's outcome is independent and recorded in the ledger.
pub async fn create_post(
    State(state): State<AppState>,
    Json(body): Json<PostRequest>,
) -> Json<PostResponse> {
    tracing::info!(
        "📣 Posting for {} to {} platform(s)",
        body.user_id,
        body.platforms.len()
    );
    let results = state.publisher.post_to_platforms(&body).await;
    Json(PostResponse { results })
}

pub async fn update_post_status(
    State(state): State<AppState>,
    Json(body): Json<UpdatePostStatusRequest>,
) -> Json<serde_json::Value> {
    match state.ledger.update_status(body.posted_id, body.status) {
        Ok(()) => Json(json!({
            "success": true,
            "postedId": body.posted_id,
            "status": body.status,
        })),
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<PostedContent>> {
    let posts = match params.get("user_id") {
        Some(user_id) => state.ledger.list_for_user(user_id),
        None => state.ledger.list(),
    };
    Json(posts)
}

pub async fn get_usage(State(state): State<AppState>) -> Json<UsageSnapshot> {
    Json(state.usage.snapshot())
}
