use chrono::Utc;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn, error};
use uuid::Uuid;

use crate::gemini::{GeminiError, ImageService};
use crate::media::{MediaFetcher, ReferenceImage};
use crate::models::{
    CellStatus, GenerateGridRequest, Generation, GenerationRequest, GridCell, CELL_COST,
    GRID_COST, MAX_REFERENCE_IMAGES,
};
use crate::prompts::{
    base_scene_prompt, compose_cell_prompt, compose_edit_prompt, compose_grid_prompt,
    CELL_LABELS, DEFAULT_NEGATIVE_PROMPT,
};
use crate::usage::UsageTracker;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("image generation failed: {0}")]
    Generation(#[from] GeminiError),
}

/// Uniform sample of up to 10 photos from the category-wide pool, fetched
/// into inline payloads. The pool is not mutated; unreachable photos are
/// skipped with a warning rather than failing the whole generation.
pub async fn sample_reference_photos(media: &MediaFetcher, pool: &[String]) -> Vec<ReferenceImage> {
    // Scoped so the thread-local RNG never lives across an await point.
    let sampled: Vec<String> = {
        let mut rng = rand::thread_rng();
        pool.choose_multiple(&mut rng, MAX_REFERENCE_IMAGES).cloned().collect()
    };

    let mut images = Vec::with_capacity(sampled.len());
    for url in &sampled {
        match media.fetch(url).await {
            Ok(image) => images.push(image),
            Err(e) => warn!("skipping unreachable reference photo {url}: {e}"),
        }
    }
    images
}

/// Generate one 4x4 composite grid and its 16 cell records.
///
/// Service errors propagate to the caller; no partial `Generation` is
/// created and no retry is attempted here.
pub async fn generate_grid(
    service: &dyn ImageService,
    media: &MediaFetcher,
    usage: &UsageTracker,
    model: &str,
    request: &GenerateGridRequest,
) -> Result<Generation, GridError> {
    let base_prompt = request
        .prompt
        .clone()
        .unwrap_or_else(|| base_scene_prompt(&request.category_id).to_string());
    let negative_prompt = request
        .negative_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string());

    let reference_images = sample_reference_photos(media, &request.photo_urls).await;
    info!(
        "🚀 Generating 4x4 grid for element '{}' ({} reference photos)",
        request.element_name,
        reference_images.len()
    );

    let grid_prompt = compose_grid_prompt(&base_prompt, &request.element_name, &negative_prompt);
    let generated = service
        .generate(&GenerationRequest::new(grid_prompt, model.to_string(), reference_images))
        .await?;

    let cells = CELL_LABELS
        .iter()
        .enumerate()
        .map(|(index, letter)| GridCell {
            letter: letter.to_string(),
            index,
            is_selected: false,
            prompt: compose_cell_prompt(&base_prompt, index),
            result_url: None,
            status: CellStatus::Pending,
        })
        .collect();

    usage.record_images(1, GRID_COST);

    Ok(Generation {
        id: Uuid::new_v4(),
        category_id: request.category_id.clone(),
        category_name: request
            .category_name
            .clone()
            .unwrap_or_else(|| request.category_id.clone()),
        element_name: request.element_name.clone(),
        grid_url: generated.url,
        cells,
        total_cost: GRID_COST,
        created_at: Utc::now(),
    })
}

/// Regenerate the selected cells strictly one at a time, edit-chaining each
/// prompt to the cells already completed. A single cell's failure marks that
/// cell `failed` and the batch moves on; the batch itself never errors.
pub async fn regenerate_selected_cells(
    service: &dyn ImageService,
    media: &MediaFetcher,
    usage: &UsageTracker,
    model: &str,
    generation: &mut Generation,
    selected: &[String],
    photo_pool: &[String],
) {
    let mut attempted = 0u32;

    for letter in selected {
        let Some(index) = generation.cells.iter().position(|c| &c.letter == letter) else {
            warn!("ignoring unknown cell letter '{letter}'");
            continue;
        };
        attempted += 1;

        generation.cells[index].status = CellStatus::Generating;
        generation.cells[index].is_selected = true;

        // Snapshot completed siblings before mutating this cell.
        let anchors: Vec<GridCell> = generation
            .cells
            .iter()
            .filter(|c| c.index != index && c.status == CellStatus::Completed && c.result_url.is_some())
            .cloned()
            .collect();
        let anchor_refs: Vec<&GridCell> = anchors.iter().collect();

        let prompt = compose_edit_prompt(
            &generation.cells[index].prompt,
            &anchor_refs,
            &generation.grid_url,
        );
        let reference_images = sample_reference_photos(media, photo_pool).await;

        info!("🎯 Regenerating cell {letter} ({} continuity anchors)", anchor_refs.len());
        match service
            .generate(&GenerationRequest::new(prompt, model.to_string(), reference_images))
            .await
        {
            Ok(generated) => {
                let cell = &mut generation.cells[index];
                cell.result_url = Some(generated.url);
                cell.status = CellStatus::Completed;
                info!("✅ Cell {letter} completed");
            }
            Err(e) => {
                generation.cells[index].status = CellStatus::Failed;
                error!("❌ Cell {letter} failed: {e}");
            }
        }
    }

    let batch_cost = f64::from(attempted) * CELL_COST;
    generation.total_cost += batch_cost;
    usage.record_images(attempted, batch_cost);
}
