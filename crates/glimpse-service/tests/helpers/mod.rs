//! Test helpers: a wired pipeline over a temp-dir store and a mockito vision API.

#![allow(dead_code)]

use glimpse_core::Config;
use glimpse_service::{setup, App};
use glimpse_storage::ObjectReader;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

pub const FETCH_BASE_URL: &str = "http://localhost:3000/media";
pub const ANALYZE_PATH: &str = "/vision/v3.2/analyze";
pub const CAT_RESPONSE: &str =
    r#"{"description":{"captions":[{"text":"a cat","confidence":0.9}]}}"#;

/// Test application: the pipeline plus the owned storage directory.
pub struct TestApp {
    pub app: App,
    pub _temp_dir: TempDir,
}

impl TestApp {
    /// Block until every published notification was acked or dead-lettered.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.app.channel.wait_until_settled())
            .await
            .expect("notifications were not settled in time");
    }
}

pub fn test_config(
    storage_dir: &std::path::Path,
    vision_url: &str,
    overrides: &[(&str, &str)],
) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        (
            "STORAGE_BACKEND_URI".to_string(),
            format!("file://{}", storage_dir.display()),
        ),
        ("FETCH_BASE_URL".to_string(), FETCH_BASE_URL.to_string()),
        (
            "VISION_API_BASE_URL".to_string(),
            format!("{}{}", vision_url, ANALYZE_PATH),
        ),
        ("VISION_API_KEY".to_string(), "test-key".to_string()),
        ("ANALYSIS_TIMEOUT_SECS".to_string(), "5".to_string()),
        ("REDELIVERY_BASE_BACKOFF_MS".to_string(), "5".to_string()),
        ("REDELIVERY_MAX_BACKOFF_SECS".to_string(), "1".to_string()),
        ("DEAD_LETTER_MAX_ATTEMPTS".to_string(), "2".to_string()),
        ("CONSUMER_MAX_WORKERS".to_string(), "1".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_source(|key| vars.get(key).cloned()).expect("test config is valid")
}

pub async fn setup_test_app(server: &mockito::ServerGuard) -> TestApp {
    setup_test_app_with(server, &[]).await
}

pub async fn setup_test_app_with(
    server: &mockito::ServerGuard,
    overrides: &[(&str, &str)],
) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(temp_dir.path(), &server.url(), overrides);
    let app = setup::initialize_app(config)
        .await
        .expect("Failed to initialize app");

    TestApp {
        app,
        _temp_dir: temp_dir,
    }
}

pub fn reader(data: &[u8]) -> ObjectReader {
    Box::pin(std::io::Cursor::new(data.to_vec()))
}

pub fn fetch_url(path: &str) -> String {
    format!("{}/{}", FETCH_BASE_URL, path)
}
