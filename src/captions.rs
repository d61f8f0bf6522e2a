use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use crate::gemini::CaptionModel;
use crate::media::MediaFetcher;
use crate::models::{CaptionSet, PlatformCaptions, ServiceCategory};
use crate::usage::UsageTracker;

const MAX_RAW_CAPTION_LEN: usize = 120;

/// Canned caption/hashtag pair per service category. Every failure path of
/// the orchestrator terminates here, so callers always get usable content.
pub fn fallback_caption(service: ServiceCategory) -> CaptionSet {
    let (caption, hashtags) = match service {
        ServiceCategory::Hair => (
            "Stunning new look ✨ Loving this transformation",
            "#HairGoals #SalonTransformation #ZaviraSalon",
        ),
        ServiceCategory::Nail => (
            "Nail goals achieved 💅 Custom luxury",
            "#NailArt #NailGoals #ZaviraSalon",
        ),
        ServiceCategory::Tattoo => (
            "Custom ink 🖤 Artwork at its finest",
            "#TattooArt #CustomInk #ZaviraSalon",
        ),
        ServiceCategory::Massage => (
            "Pure relaxation 🧘 Zen mode activated",
            "#MassageTherapy #Wellness #ZaviraSalon",
        ),
        ServiceCategory::Facial => (
            "Glowing skin ✨ Treatment goals",
            "#FacialTreatment #SkinGlow #ZaviraSalon",
        ),
        ServiceCategory::Glow => (
            "That salon glow ✨ Beautiful you",
            "#SalonGlow #BeautyGoals #ZaviraSalon",
        ),
    };
    CaptionSet { caption: caption.to_string(), hashtags: hashtags.to_string() }
}

fn caption_prompt(service: ServiceCategory) -> String {
    format!(
        "You are a luxury salon social media expert. Analyze this {} service image carefully.\n\n\
         Create:\n\
         1. A SHORT, captivating caption (1-2 sentences max) that describes what you see\n\
         2. A list of 5-8 trending salon hashtags\n\n\
         Return ONLY a JSON object with exactly this format:\n\
         {{\n  \"caption\": \"Your caption here\",\n  \"hashtags\": \"#tag1 #tag2 #tag3 #tag4 #tag5\"\n}}",
        service.as_str()
    )
}

pub struct CaptionGenerator {
    model: Option<Arc<dyn CaptionModel>>,
    media: MediaFetcher,
    usage: Arc<UsageTracker>,
}

impl CaptionGenerator {
    pub fn new(
        model: Option<Arc<dyn CaptionModel>>,
        media: MediaFetcher,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self { model, media, usage }
    }

    /// Generate a caption/hashtag pair for one image. Never fails and never
    /// returns an empty caption: configuration errors, unreadable images,
    /// service failures and unparseable responses all fall back to the
    /// category's canned pair. Quota errors open a 24-hour circuit-breaker
    /// so subsequent calls skip the network entirely.
    pub async fn generate(&self, image_url: &str, service: ServiceCategory) -> CaptionSet {
        if self.usage.is_quota_exhausted() {
            info!("Caption quota exhausted, serving fallback for '{}'", service.as_str());
            return fallback_caption(service);
        }

        let Some(model) = &self.model else {
            info!("No caption credential configured, serving fallback for '{}'", service.as_str());
            return fallback_caption(service);
        };

        let image = match self.media.fetch(image_url).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Could not read caption image: {e}");
                return fallback_caption(service);
            }
        };

        match model.caption(&image, &caption_prompt(service)).await {
            Ok(raw) => parse_caption_response(&raw, service),
            Err(e) => {
                if e.is_quota_error() {
                    self.usage.mark_quota_exhausted();
                } else {
                    warn!("Caption generation failed: {e}");
                }
                fallback_caption(service)
            }
        }
    }

    /// One caption set per target platform from a single generation call.
    pub async fn generate_for_platforms(
        &self,
        image_url: &str,
        service: ServiceCategory,
    ) -> PlatformCaptions {
        PlatformCaptions::uniform(self.generate(image_url, service).await)
    }
}

// --- Response parsing ---

type ParserStrategy = fn(&str, ServiceCategory) -> Option<CaptionSet>;

/// Ordered parser chain: structured JSON, regex field extraction, raw-text
/// truncation. The last tier always produces something, so parsing never
/// surfaces an error.
const PARSERS: [ParserStrategy; 3] = [parse_structured, parse_fields, parse_truncated];

pub fn parse_caption_response(raw: &str, service: ServiceCategory) -> CaptionSet {
    let stripped = strip_code_fences(raw);
    for parser in PARSERS {
        if let Some(set) = parser(&stripped, service) {
            if !set.caption.trim().is_empty() {
                return set;
            }
        }
    }
    fallback_caption(service)
}

/// Models often wrap the JSON object in a fenced code block; strip it before
/// parsing.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = match rest.rfind("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    rest.trim().to_string()
}

fn parse_structured(text: &str, _service: ServiceCategory) -> Option<CaptionSet> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let caption = value.get("caption")?.as_str()?.trim().to_string();
    let hashtags = match value.get("hashtags") {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    };
    Some(CaptionSet { caption, hashtags })
}

fn parse_fields(text: &str, service: ServiceCategory) -> Option<CaptionSet> {
    let caption_re = Regex::new(r#"(?i)"?caption"?\s*[:=]\s*"([^"\n]+)""#).ok()?;
    let hashtags_re = Regex::new(r#"(?i)"?hashtags"?\s*[:=]\s*"([^"\n]+)""#).ok()?;

    let caption = caption_re.captures(text)?.get(1)?.as_str().trim().to_string();
    let hashtags = hashtags_re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| scrape_hashtags(text, service));

    Some(CaptionSet { caption, hashtags })
}

fn parse_truncated(text: &str, service: ServiceCategory) -> Option<CaptionSet> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }
    let caption: String = cleaned.chars().take(MAX_RAW_CAPTION_LEN).collect();
    Some(CaptionSet { caption, hashtags: scrape_hashtags(text, service) })
}

fn scrape_hashtags(text: &str, service: ServiceCategory) -> String {
    let re = Regex::new(r"#[A-Za-z0-9_]+").expect("static hashtag pattern");
    let found: Vec<&str> = re.find_iter(text).map(|m| m.as_str()).collect();
    if found.is_empty() {
        fallback_caption(service).hashtags
    } else {
        found.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiError;
    use crate::media::ReferenceImage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    struct ScriptedModel {
        calls: Mutex<u32>,
        response: Result<String, GeminiError>,
    }

    impl ScriptedModel {
        fn new(response: Result<String, GeminiError>) -> Arc<Self> {
            Arc::new(Self { calls: Mutex::new(0), response })
        }
    }

    #[async_trait]
    impl CaptionModel for ScriptedModel {
        async fn caption(&self, _image: &ReferenceImage, _prompt: &str) -> Result<String, GeminiError> {
            *self.calls.lock() += 1;
            match &self.response {
                Ok(s) => Ok(s.clone()),
                Err(GeminiError::Http { status, body }) => {
                    Err(GeminiError::Http { status: *status, body: body.clone() })
                }
                Err(_) => Err(GeminiError::NoText),
            }
        }
    }

    const IMAGE_URL: &str =
        "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8DwHwAFBQIAX8jx0gAAAABJRU5ErkJggg==";

    const ALL_CATEGORIES: [ServiceCategory; 6] = [
        ServiceCategory::Hair,
        ServiceCategory::Nail,
        ServiceCategory::Tattoo,
        ServiceCategory::Massage,
        ServiceCategory::Facial,
        ServiceCategory::Glow,
    ];

    #[test]
    fn every_category_has_a_non_empty_fallback() {
        for category in ALL_CATEGORIES {
            let set = fallback_caption(category);
            assert!(!set.caption.is_empty());
            assert!(!set.hashtags.is_empty());
        }
    }

    #[tokio::test]
    async fn no_credential_serves_the_hair_fallback() {
        let usage = Arc::new(UsageTracker::new());
        let generator = CaptionGenerator::new(None, MediaFetcher::new(), usage);

        let set = generator.generate(IMAGE_URL, ServiceCategory::Hair).await;
        assert_eq!(set.caption, "Stunning new look ✨ Loving this transformation");
        assert_eq!(set.hashtags, "#HairGoals #SalonTransformation #ZaviraSalon");
    }

    #[tokio::test]
    async fn exhausted_quota_short_circuits_the_network_call() {
        let usage = Arc::new(UsageTracker::new());
        usage.mark_quota_exhausted();
        let model = ScriptedModel::new(Ok("{\"caption\": \"live\", \"hashtags\": \"#x\"}".into()));
        let generator =
            CaptionGenerator::new(Some(model.clone()), MediaFetcher::new(), usage.clone());

        let set = generator.generate(IMAGE_URL, ServiceCategory::Nail).await;
        assert_eq!(*model.calls.lock(), 0);
        assert_eq!(set, fallback_caption(ServiceCategory::Nail));
    }

    #[tokio::test]
    async fn quota_error_opens_the_circuit_breaker() {
        let usage = Arc::new(UsageTracker::new());
        let model =
            ScriptedModel::new(Err(GeminiError::Http { status: 429, body: "slow down".into() }));
        let generator =
            CaptionGenerator::new(Some(model.clone()), MediaFetcher::new(), usage.clone());

        let set = generator.generate(IMAGE_URL, ServiceCategory::Glow).await;
        assert_eq!(set, fallback_caption(ServiceCategory::Glow));
        assert!(usage.is_quota_exhausted());

        // Second call must not hit the model again.
        generator.generate(IMAGE_URL, ServiceCategory::Glow).await;
        assert_eq!(*model.calls.lock(), 1);
    }

    #[tokio::test]
    async fn unreadable_image_falls_back_without_calling_the_model() {
        let usage = Arc::new(UsageTracker::new());
        let model = ScriptedModel::new(Ok("unused".into()));
        let generator =
            CaptionGenerator::new(Some(model.clone()), MediaFetcher::new(), usage);

        let set = generator.generate("data:image/png,not-base64", ServiceCategory::Facial).await;
        assert_eq!(set, fallback_caption(ServiceCategory::Facial));
        assert_eq!(*model.calls.lock(), 0);
    }

    #[tokio::test]
    async fn live_response_is_parsed_and_returned() {
        let usage = Arc::new(UsageTracker::new());
        let model = ScriptedModel::new(Ok(
            "```json\n{\"caption\": \"Dimensional balayage perfection\", \"hashtags\": \"#Balayage #HairArt\"}\n```".into(),
        ));
        let generator = CaptionGenerator::new(Some(model), MediaFetcher::new(), usage);

        let set = generator.generate(IMAGE_URL, ServiceCategory::Hair).await;
        assert_eq!(set.caption, "Dimensional balayage perfection");
        assert_eq!(set.hashtags, "#Balayage #HairArt");
    }

    #[test]
    fn tier_one_parses_plain_json() {
        let set = parse_caption_response(
            "{\"caption\": \"Fresh set\", \"hashtags\": [\"#nails\", \"#gel\"]}",
            ServiceCategory::Nail,
        );
        assert_eq!(set.caption, "Fresh set");
        assert_eq!(set.hashtags, "#nails #gel");
    }

    #[test]
    fn tier_two_extracts_fields_from_malformed_json() {
        let set = parse_caption_response(
            "Sure! Here you go: \"caption\": \"Silky waves all day\", \"hashtags\": \"#waves #shine\" hope it helps",
            ServiceCategory::Hair,
        );
        assert_eq!(set.caption, "Silky waves all day");
        assert_eq!(set.hashtags, "#waves #shine");
    }

    #[test]
    fn tier_three_truncates_raw_text() {
        let long = "A gorgeous transformation with copper tones ".repeat(8);
        let set = parse_caption_response(&long, ServiceCategory::Hair);
        assert_eq!(set.caption.chars().count(), MAX_RAW_CAPTION_LEN);
        // No hashtags in the text, so the category fallbacks fill in.
        assert_eq!(set.hashtags, fallback_caption(ServiceCategory::Hair).hashtags);
    }

    #[test]
    fn empty_response_lands_on_the_fallback() {
        let set = parse_caption_response("   ", ServiceCategory::Massage);
        assert_eq!(set, fallback_caption(ServiceCategory::Massage));
    }

    #[test]
    fn fence_stripping_handles_json_label() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("plain"), "plain");
    }
}
