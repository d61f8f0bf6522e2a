mod captions;
mod gemini;
mod grid;
mod ledger;
mod media;
mod models;
mod prompts;
mod publish;
mod routes;
mod usage;
mod video;

use axum::{Router, routing::{post, get}};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing_subscriber::{fmt, EnvFilter};
use tower_http::cors::{CorsLayer, Any};

use crate::captions::CaptionGenerator;
use crate::gemini::{CaptionModel, GeminiClient, GeminiConfig};
use crate::ledger::PostLedger;
use crate::media::MediaFetcher;
use crate::publish::{
    Publisher, RestUploadClient, UploadApiConfig, UploadPlatform, WebhookConfig,
};
use crate::routes::AppState;
use crate::usage::UsageTracker;
use crate::video::{VideoAssembler, VideoConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let gemini_config = GeminiConfig::from_env();
    let image_model = gemini_config.image_model.clone();
    let gemini = Arc::new(GeminiClient::new(gemini_config));
    if !gemini.has_credential() {
        tracing::warn!("No GEMINI_API_KEY set: caption generation will serve fallbacks and grid generation will fail");
    }

    let media = MediaFetcher::new();
    let usage = Arc::new(UsageTracker::new());
    let ledger = Arc::new(PostLedger::new());

    let caption_model: Option<Arc<dyn CaptionModel>> = if gemini.has_credential() {
        Some(gemini.clone() as Arc<dyn CaptionModel>)
    } else {
        None
    };
    let captions = Arc::new(CaptionGenerator::new(caption_model, media.clone(), usage.clone()));

    let video = Arc::new(VideoAssembler::new(VideoConfig::from_env(), media.clone()));

    let platform_api: Option<Arc<dyn UploadPlatform>> = UploadApiConfig::from_env()
        .map(|config| Arc::new(RestUploadClient::new(config)) as Arc<dyn UploadPlatform>);
    if platform_api.is_none() {
        tracing::warn!("No chunked upload API configured: direct platform posting is disabled");
    }
    let publisher = Arc::new(Publisher::new(
        WebhookConfig::from_env(),
        platform_api,
        media.clone(),
        ledger.clone(),
        usage.clone(),
    ));

    let state = AppState {
        generations: Arc::new(RwLock::new(HashMap::new())),
        gemini,
        image_model,
        media,
        captions,
        video,
        publisher,
        ledger,
        usage,
    };

    let app = Router::new()
        .route("/api/generations", post(routes::generate_grid).get(routes::list_generations))
        .route("/api/generations/:id", get(routes::get_generation))
        .route("/api/generations/:id/regenerate", post(routes::regenerate_cells))
        .route("/api/captions", post(routes::generate_captions))
        .route("/api/videos", post(routes::create_video))
        .route("/api/posts", post(routes::create_post).get(routes::list_posts))
        .route("/api/posts/status", post(routes::update_post_status))
        .route("/api/usage", get(routes::get_usage))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting salon studio server");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
