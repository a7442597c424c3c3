//! Image analysis results.

use serde::{Deserialize, Serialize};

/// One generated caption and the service's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorInfo {
    pub dominant_color_foreground: Option<String>,
    pub dominant_color_background: Option<String>,
    pub dominant_colors: Vec<String>,
    pub accent_color: Option<String>,
    pub is_black_and_white: bool,
}

/// Parsed outcome of a successful analysis call. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub captions: Vec<Caption>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub color: Option<ColorInfo>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl AnalysisResult {
    pub fn from_captions(captions: Vec<Caption>) -> Self {
        Self {
            captions,
            ..Default::default()
        }
    }

    /// Caption with the highest confidence.
    pub fn best_caption(&self) -> Option<&Caption> {
        self.captions
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}
