use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::suggest::generator::{send_json, SuggestionGenerator};

pub struct GeminiGenerator {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!(
                "generator.backend is gemini but no API key is set (generator.api_key or GEMINI_API_KEY)"
            ));
        }
        if config.gemini_model.trim().is_empty() {
            return Err(anyhow!(
                "generator.backend is gemini but generator.gemini_model is empty"
            ));
        }

        Ok(Self {
            base_url: config.gemini_host.trim_end_matches('/').to_string(),
            model: config.gemini_model,
            api_key: config.api_key,
            temperature: config.temperature,
            client: Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl SuggestionGenerator for GeminiGenerator {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let payload = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let request = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload);
        let parsed: GenerateContentResponse = send_json(request, self.name()).await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("gemini returned no candidates"))?
            .content
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            return Err(anyhow!("gemini returned empty text"));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
