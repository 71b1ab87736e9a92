use crate::config::ClassifierConfig;
use anyhow::{Context, Result};
use bytes::Bytes;
use image::imageops::FilterType;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// RGB pixels in row-major HWC order, raw 0..=255 values as f32
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Nested `[height][width][channel]` layout expected by the model server
    fn to_nested(&self) -> Vec<Vec<[f32; 3]>> {
        self.data
            .chunks_exact(3 * self.width as usize)
            .map(|row| {
                row.chunks_exact(3)
                    .map(|px| [px[0], px[1], px[2]])
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Probability of the top class, in percent
    pub confidence: f64,
}

/// Decode any supported image, force 3 channels and resize to `size`×`size`
pub fn preprocess(image: &[u8], size: u32) -> Result<ImageTensor> {
    let decoded = image::load_from_memory(image).context("Failed to decode image")?;
    let resized = decoded
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let data = resized.into_raw().into_iter().map(f32::from).collect();

    Ok(ImageTensor {
        width: size,
        height: size,
        data,
    })
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Inference runtime that turns an image tensor into per-class scores (logits)
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    async fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// Raw image bytes in, top class out
#[async_trait::async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, image: Bytes) -> Result<Prediction>;
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<[f32; 3]>>>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ModelStatusResponse {
    model_version_status: Vec<ModelVersionStatus>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionStatus {
    state: String,
}

/// TensorFlow Serving REST backend
#[derive(Clone)]
pub struct TfServingBackend {
    client: Client,
    base_url: String,
    model_name: String,
}

impl TfServingBackend {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
        }
    }

    /// Succeeds only when at least one model version is AVAILABLE
    pub async fn check_status(&self) -> Result<()> {
        let url = format!("{}/v1/models/{}", self.base_url, self.model_name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to model server")?;

        if !response.status().is_success() {
            anyhow::bail!("Model status request failed ({})", response.status());
        }

        let status: ModelStatusResponse = response
            .json()
            .await
            .context("Failed to parse model status")?;

        if status
            .model_version_status
            .iter()
            .any(|v| v.state.eq_ignore_ascii_case("AVAILABLE"))
        {
            Ok(())
        } else {
            anyhow::bail!("Model '{}' has no available version", self.model_name)
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for TfServingBackend {
    async fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let url = format!("{}/v1/models/{}:predict", self.base_url, self.model_name);
        let request = PredictRequest {
            instances: vec![input.to_nested()],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to call model server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Model server error ({}): {}", status, body);
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .context("Failed to parse prediction response")?;

        parsed
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Model server returned no predictions"))
    }
}

/// Skin condition classifier: preprocessing + backend inference + softmax/argmax
pub struct SkinClassifier {
    backend: Arc<dyn ModelBackend>,
    labels: Vec<String>,
    image_size: u32,
}

impl SkinClassifier {
    pub fn new(backend: Arc<dyn ModelBackend>, labels: Vec<String>, image_size: u32) -> Self {
        Self {
            backend,
            labels,
            image_size,
        }
    }

    /// Connect to the model server; fails if the model is not being served
    pub async fn load(config: &ClassifierConfig) -> Result<Self> {
        info!(
            "Loading classifier '{}' from {}",
            config.model_name, config.base_url
        );
        let backend = TfServingBackend::new(config);
        backend.check_status().await?;

        Ok(Self::new(
            Arc::new(backend),
            config.labels.clone(),
            config.image_size,
        ))
    }
}

#[async_trait::async_trait]
impl ImageClassifier for SkinClassifier {
    async fn classify(&self, image: Bytes) -> Result<Prediction> {
        let size = self.image_size;
        let tensor = tokio::task::spawn_blocking(move || preprocess(&image, size)).await??;

        let logits = self.backend.predict(&tensor).await?;
        if logits.len() != self.labels.len() {
            anyhow::bail!(
                "Model returned {} scores for {} labels",
                logits.len(),
                self.labels.len()
            );
        }
        // A NaN confidence would pass any threshold comparison
        if logits.iter().any(|l| !l.is_finite()) {
            anyhow::bail!("Model returned non-finite scores");
        }

        let scores = softmax(&logits);
        let (index, probability) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| anyhow::anyhow!("Model returned no scores"))?;

        let prediction = Prediction {
            label: self.labels[index].clone(),
            confidence: f64::from(probability) * 100.0,
        };
        debug!(
            "Predicted {} ({:.1}%)",
            prediction.label, prediction.confidence
        );
        Ok(prediction)
    }
}
