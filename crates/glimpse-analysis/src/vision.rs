//! Vision API client for image captioning and tagging.

use async_trait::async_trait;
use glimpse_core::{AnalysisResult, Caption, Category, ColorInfo, Config};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};

use crate::{AnalysisError, AnalysisService};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const VISUAL_FEATURES: &str = "Categories,Description,Color";
const LANGUAGE: &str = "en";
const MAX_ERROR_BODY_CHARS: usize = 512;

pub struct VisionClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl Debug for VisionClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VisionClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl VisionClient {
    /// `base_url` is the full analyze endpoint; query parameters are appended.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AnalysisError::Config("vision API key is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AnalysisError::Config(format!("Failed to create HTTP client for vision API: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AnalysisError> {
        Self::new(
            config.vision_api_base_url.clone(),
            config.vision_api_key.clone(),
            config.analysis_timeout,
        )
    }

    fn request_error(&self, err: reqwest::Error) -> AnalysisError {
        if err.is_timeout() {
            AnalysisError::Timeout(self.timeout)
        } else {
            AnalysisError::Transport(err.to_string())
        }
    }

    async fn send(&self, url: &str) -> Result<(StatusCode, String), AnalysisError> {
        let response = self
            .http_client
            .post(&self.base_url)
            .query(&[("visualFeatures", VISUAL_FEATURES), ("language", LANGUAGE)])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.request_error(e))?;
        Ok((status, body))
    }
}

#[async_trait]
impl AnalysisService for VisionClient {
    #[tracing::instrument(skip(self), fields(url = %url))]
    async fn analyze(&self, url: &str) -> Result<AnalysisResult, AnalysisError> {
        let start = Instant::now();

        let (status, body) = match self.send(url).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Vision API request failed"
                );
                return Err(e);
            }
        };

        tracing::info!(
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Vision API request completed"
        );

        if status != StatusCode::OK {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        parse_response(&body)
    }
}

/// Parse a vision API response body. `description.captions` is required.
pub fn parse_response(body: &str) -> Result<AnalysisResult, AnalysisError> {
    if body.trim().is_empty() {
        return Err(AnalysisError::EmptyBody);
    }

    let response: VisionResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    response.try_into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisionResponse {
    description: Option<VisionDescription>,
    #[serde(default)]
    categories: Vec<VisionCategory>,
    color: Option<VisionColor>,
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VisionDescription {
    captions: Option<Vec<VisionCaption>>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VisionCaption {
    text: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct VisionCategory {
    name: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisionColor {
    dominant_color_foreground: Option<String>,
    dominant_color_background: Option<String>,
    #[serde(default)]
    dominant_colors: Vec<String>,
    accent_color: Option<String>,
    #[serde(default)]
    is_bw_img: bool,
}

impl TryFrom<VisionResponse> for AnalysisResult {
    type Error = AnalysisError;

    fn try_from(response: VisionResponse) -> Result<Self, Self::Error> {
        let description = response.description.ok_or_else(|| {
            AnalysisError::Malformed("response has no description".to_string())
        })?;
        let captions = description.captions.ok_or_else(|| {
            AnalysisError::Malformed("response has no description.captions".to_string())
        })?;

        Ok(AnalysisResult {
            captions: captions
                .into_iter()
                .map(|c| Caption {
                    text: c.text,
                    confidence: c.confidence,
                })
                .collect(),
            tags: description.tags,
            categories: response
                .categories
                .into_iter()
                .map(|c| Category {
                    name: c.name,
                    score: c.score,
                })
                .collect(),
            color: response.color.map(|c| ColorInfo {
                dominant_color_foreground: c.dominant_color_foreground,
                dominant_color_background: c.dominant_color_background,
                dominant_colors: c.dominant_colors,
                accent_color: c.accent_color,
                is_black_and_white: c.is_bw_img,
            }),
            request_id: response.request_id,
        })
    }
}
