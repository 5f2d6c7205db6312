mod gemini;
mod ollama;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::config::{DaemonConfig, GeneratorBackend};

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;

#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder, backend: &str) -> Result<T> {
    let response = request
        .send()
        .await
        .with_context(|| format!("failed to call {backend} API"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("failed to read {backend} response body"))?;
    if !status.is_success() {
        return Err(anyhow!("{backend} API failed ({status}): {body}"));
    }
    serde_json::from_str(&body).with_context(|| format!("invalid {backend} response format"))
}

pub fn from_config(config: &DaemonConfig) -> Option<Arc<dyn SuggestionGenerator>> {
    let generator = &config.generator;
    let built: Result<Arc<dyn SuggestionGenerator>> = match config.effective_backend() {
        GeneratorBackend::Auto | GeneratorBackend::None => {
            info!("no generative backend configured, serving static suggestions");
            return None;
        }
        GeneratorBackend::Gemini => GeminiGenerator::new(generator.clone())
            .map(|backend| Arc::new(backend) as Arc<dyn SuggestionGenerator>),
        GeneratorBackend::Ollama => OllamaGenerator::new(generator.clone())
            .map(|backend| Arc::new(backend) as Arc<dyn SuggestionGenerator>),
    };

    match built {
        Ok(backend) => Some(backend),
        Err(error) => {
            warn!("failed to init generative backend, static suggestions only: {error:#}");
            None
        }
    }
}
