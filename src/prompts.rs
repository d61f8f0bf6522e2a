use crate::models::GridCell;

pub const CELL_LABELS: [&str; 16] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P",
];

pub const SKIN_TONES: [&str; 4] = [
    "with fair/light skin tone",
    "with light medium skin tone",
    "with medium skin tone",
    "with medium-dark skin tone",
];

pub const EXPRESSIONS: [&str; 16] = [
    "smiling warmly",
    "confident focused",
    "laughing naturally",
    "thoughtful serene",
    "relaxed content",
    "determined professional",
    "playful engaged",
    "calm peaceful",
    "excited joyful",
    "curious interested",
    "satisfied elegant",
    "neutral composed",
    "friendly welcoming",
    "gentle kind",
    "strong assured",
    "happily glowing",
];

pub const HAIR_STYLES: [&str; 16] = [
    "with straight black hair",
    "with wavy brown hair",
    "with curly hair",
    "with blonde ponytail",
    "with red bob cut",
    "with long dark hair",
    "with medium layered cut",
    "with updo style",
    "with braids",
    "with short pixie",
    "with side-part style",
    "with messy texture",
    "with sleek polished style",
    "with natural waves",
    "with auburn hair",
    "with silver-grey hair",
];

pub const OUTFITS: [&str; 6] = [
    "in white professional outfit",
    "in black casual wear",
    "in blue stylish clothing",
    "in green ensemble",
    "in pink attire",
    "in neutral beige",
];

pub const DEFAULT_NEGATIVE_PROMPT: &str = "no watermark, no text, no logo, blur, low quality, ugly, deformed, extra limbs, distorted hands, cartoon, illustration, anime style, oversaturated, noise, grain, cropped, floating object, wrong proportions, blurry, pixelated, low resolution, poor lighting, harsh shadows, color cast";

/// Category-appropriate scene descriptions for the grid prompt.
pub fn base_scene_prompt(category_id: &str) -> &'static str {
    match category_id {
        "hair" => "Beautiful diverse group of 16 women at modern hair salon. Varied ethnicities including African, Asian, Caucasian, Latin American. Ages 20-60. Diverse skin tones from fair to deep dark. Various hair textures - straight, wavy, curly, coily. Different lengths and styles. Professional beauty photography, soft natural lighting, magazine editorial quality. High-end salon interior. No watermarks, no text, no logos, no blur, no distortion.",
        "nail" => "Elegant nail art design on manicured hands, close-up professional beauty shot, intricate details, vibrant colors, glossy finish, professional studio lighting, high-end beauty photography, no watermarks, no text, no logos.",
        "tattoo" => "Artistic tattoo design on skin, professional tattoo photography, clean aesthetic, detailed linework, high contrast, professional lighting, magazine quality, no watermarks, no text, no logos.",
        _ => "Professional salon service photography, clean aesthetic, soft natural lighting, magazine editorial quality, no watermarks, no text, no logos.",
    }
}

/// Full instruction for a single 4x4 composite grid image. Deterministic
/// concatenation, no randomness.
pub fn compose_grid_prompt(base_prompt: &str, element_name: &str, negative_prompt: &str) -> String {
    format!(
        "Create one single image laid out as a 4x4 grid of 16 distinct cells. {base_prompt} \
         Theme: {element_name}. Each cell is an independent composition; keep cells visually \
         separated with thin margins. Avoid: {negative_prompt}"
    )
}

/// Deterministic pseudo-random variation for one cell. Indexing by
/// `cell_index mod table_len` means all 16 expressions and hairstyles appear
/// exactly once per grid while skin tones and outfits repeat with a fixed
/// period.
pub fn compose_cell_prompt(base_prompt: &str, cell_index: usize) -> String {
    let skin = SKIN_TONES[cell_index % SKIN_TONES.len()];
    let expression = EXPRESSIONS[cell_index % EXPRESSIONS.len()];
    let hair = HAIR_STYLES[cell_index % HAIR_STYLES.len()];
    let outfit = OUTFITS[cell_index % OUTFITS.len()];

    format!("{base_prompt}, {skin}, {expression}, {hair}, {outfit}")
}

/// Edit-chained prompt for regenerating one cell. Completed sibling cells are
/// continuity anchors; with none completed yet, the original grid image is
/// the sole anchor.
pub fn compose_edit_prompt(cell_prompt: &str, prior_cells: &[&GridCell], grid_url: &str) -> String {
    if prior_cells.is_empty() {
        return format!(
            "Using the attached original grid image ({grid_url}) as the only style and \
             continuity reference, generate a single standalone image: {cell_prompt}"
        );
    }

    let mut anchors = String::new();
    for cell in prior_cells {
        let url = cell.result_url.as_deref().unwrap_or_default();
        anchors.push_str(&format!("- cell {} ({}): {}\n", cell.letter, url, cell.prompt));
    }

    format!(
        "Keep visual continuity with these already-generated cells:\n{anchors}\
         Match their lighting, styling and mood. Generate a single standalone image: {cell_prompt}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellStatus;
    use pretty_assertions::assert_eq;

    fn cell(letter: &str, prompt: &str, url: Option<&str>) -> GridCell {
        GridCell {
            letter: letter.to_string(),
            index: 0,
            is_selected: false,
            prompt: prompt.to_string(),
            result_url: url.map(String::from),
            status: if url.is_some() { CellStatus::Completed } else { CellStatus::Pending },
        }
    }

    #[test]
    fn cell_prompt_uses_modular_table_selection() {
        for index in 0..16 {
            let prompt = compose_cell_prompt("base", index);
            let expected = format!(
                "base, {}, {}, {}, {}",
                SKIN_TONES[index % 4],
                EXPRESSIONS[index % 16],
                HAIR_STYLES[index % 16],
                OUTFITS[index % 6],
            );
            assert_eq!(prompt, expected);
        }
    }

    #[test]
    fn every_expression_and_hairstyle_used_exactly_once_per_grid() {
        let prompts: Vec<String> = (0..16).map(|i| compose_cell_prompt("base", i)).collect();
        for expression in EXPRESSIONS {
            assert_eq!(prompts.iter().filter(|p| p.contains(expression)).count(), 1);
        }
        for hair in HAIR_STYLES {
            assert_eq!(prompts.iter().filter(|p| p.contains(hair)).count(), 1);
        }
    }

    #[test]
    fn grid_prompt_is_deterministic_concatenation() {
        let a = compose_grid_prompt("scene", "Balayage", "blur");
        let b = compose_grid_prompt("scene", "Balayage", "blur");
        assert_eq!(a, b);
        assert!(a.contains("scene"));
        assert!(a.contains("Balayage"));
        assert!(a.contains("Avoid: blur"));
    }

    #[test]
    fn edit_prompt_falls_back_to_grid_anchor() {
        let prompt = compose_edit_prompt("cell prompt", &[], "https://img/grid.png");
        assert!(prompt.contains("https://img/grid.png"));
        assert!(prompt.contains("cell prompt"));
    }

    #[test]
    fn edit_prompt_lists_completed_cells_as_anchors() {
        let a = cell("A", "prompt a", Some("https://img/a.png"));
        let c = cell("C", "prompt c", Some("https://img/c.png"));
        let prompt = compose_edit_prompt("cell prompt", &[&a, &c], "https://img/grid.png");
        assert!(prompt.contains("cell A"));
        assert!(prompt.contains("https://img/c.png"));
        assert!(!prompt.contains("https://img/grid.png"));
    }
}
