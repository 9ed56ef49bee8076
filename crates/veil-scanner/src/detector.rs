use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A typed entity span reported by the detector.
///
/// `start`/`end` are half-open **character** offsets into the analysed text.
/// The scanner indexes by characters throughout, so multi-byte input is safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Common interface for PII entity detectors.
///
/// Inference is typically CPU-bound; implementations must not run it on the
/// caller's event loop. The production adapter talks to an inference
/// service over HTTP, which keeps the model's compute in its own process.
#[async_trait]
pub trait EntityDetector: Send + Sync {
    /// Detector name for logging.
    fn name(&self) -> &str;

    async fn predict(&self, text: &str, labels: &[&str]) -> Result<Vec<Entity>, DetectorError>;
}

/// HTTP adapter for a GLiNER-style inference service.
///
/// Request:  `{"text": "...", "labels": ["person", ...]}`
/// Response: `{"entities": [{"start": 0, "end": 5, "label": "person", "score": 0.93}]}`
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpDetector {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
    labels: &'a [&'a str],
}

#[derive(Deserialize)]
struct PredictResponse {
    entities: Vec<Entity>,
}

#[async_trait]
impl EntityDetector for HttpDetector {
    fn name(&self) -> &str {
        "http"
    }

    async fn predict(&self, text: &str, labels: &[&str]) -> Result<Vec<Entity>, DetectorError> {
        debug!(len = text.len(), "requesting entity prediction");

        let resp = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&PredictRequest { text, labels })
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, body = %message, "detector API error");
            return Err(DetectorError::Api { status, message });
        }

        let parsed: PredictResponse = resp
            .json()
            .await
            .map_err(|e| DetectorError::Parse(e.to_string()))?;

        Ok(parsed.entities)
    }
}

/// Detector that finds nothing. Development fallback when no inference
/// service is configured — the regex phase still runs.
pub struct NoopDetector;

#[async_trait]
impl EntityDetector for NoopDetector {
    fn name(&self) -> &str {
        "noop"
    }

    async fn predict(&self, _text: &str, _labels: &[&str]) -> Result<Vec<Entity>, DetectorError> {
        Ok(Vec::new())
    }
}

/// Detector returning a fixed entity list, for tests.
pub struct StaticDetector {
    entities: Vec<Entity>,
}

impl StaticDetector {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl EntityDetector for StaticDetector {
    fn name(&self) -> &str {
        "static"
    }

    async fn predict(&self, _text: &str, _labels: &[&str]) -> Result<Vec<Entity>, DetectorError> {
        Ok(self.entities.clone())
    }
}
