//! Keyword classifier for template tags and category.

use trender_models::{Analysis, DEFAULT_CATEGORY};

/// Tag assigned when no keyword matches.
pub const DEFAULT_TAG: &str = "general";

const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    ("travel", &["travel", "journey", "adventure", "destination", "tourist"]),
    ("lifestyle", &["lifestyle", "daily", "routine", "life"]),
    ("food", &["food", "cooking", "restaurant", "meal", "kitchen"]),
    ("fashion", &["fashion", "outfit", "clothes", "style", "wear"]),
    ("fitness", &["fitness", "workout", "gym", "exercise", "training"]),
    ("nature", &["nature", "outdoor", "landscape", "mountain", "forest", "beach"]),
    ("urban", &["city", "urban", "street", "downtown", "building"]),
    ("cinematic", &["cinematic", "film", "movie", "dramatic"]),
    ("tutorial", &["tutorial", "how-to", "guide", "learn"]),
];

/// Checked in order; the first match wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("cinematic", &["cinematic", "film"]),
    ("commercial", &["commercial", "advertisement"]),
    ("tutorial", &["tutorial", "how-to"]),
    ("music", &["music video"]),
    ("documentary", &["documentary"]),
    ("social", &["social", "vertical"]),
];

/// Tags from the subject, environment and style text.
pub fn extract_tags(subject: &str, environment: &str, style: &str) -> Vec<String> {
    let text = format!("{} {} {}", subject, environment, style).to_lowercase();

    let tags: Vec<String> = TAG_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(tag, _)| tag.to_string())
        .collect();

    if tags.is_empty() {
        vec![DEFAULT_TAG.to_string()]
    } else {
        tags
    }
}

/// Category from the style text.
pub fn detect_category(style: &str) -> &'static str {
    let style = style.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| style.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Template tags for an analysis: its own tags, or classified ones.
pub fn template_tags(analysis: &Analysis) -> Vec<String> {
    if analysis.tags.is_empty() {
        extract_tags(&analysis.subject, &analysis.environment, &analysis.style)
    } else {
        analysis.tags.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trender_models::{AnalysisDraft, AnalysisType, ReelId};

    #[test]
    fn test_extract_tags() {
        assert_eq!(
            extract_tags("A chef cooking", "city street at night", "Cinematic"),
            vec!["food", "urban", "cinematic"]
        );
        assert_eq!(extract_tags("", "", ""), vec!["general"]);
    }

    #[test]
    fn test_category_priority() {
        // "film" matches cinematic before "commercial" is considered.
        assert_eq!(detect_category("Commercial film look"), "cinematic");
        assert_eq!(detect_category("TV advertisement"), "commercial");
        assert_eq!(detect_category("how-to clip"), "tutorial");
        assert_eq!(detect_category("Music Video"), "music");
        assert_eq!(detect_category("documentary"), "documentary");
        assert_eq!(detect_category("vertical social"), "social");
        assert_eq!(detect_category("handheld"), "viral");
    }

    #[test]
    fn test_template_tags_prefer_analysis_tags() {
        let draft = AnalysisDraft {
            subject: "gym workout".to_string(),
            tags: vec!["sports".to_string()],
            ..AnalysisDraft::default()
        };
        let analysis = Analysis::from_draft(ReelId::from("r1"), AnalysisType::Standard, "r1.mp4", draft);
        assert_eq!(template_tags(&analysis), vec!["sports"]);

        let draft = AnalysisDraft {
            subject: "gym workout".to_string(),
            ..AnalysisDraft::default()
        };
        let analysis = Analysis::from_draft(ReelId::from("r1"), AnalysisType::Standard, "r1.mp4", draft);
        assert_eq!(template_tags(&analysis), vec!["fitness"]);
    }
}
