use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::suggest::generator::{send_json, SuggestionGenerator};

const SYSTEM_PROMPT: &str = "You suggest everyday activities. Reply with raw JSON only.";

pub struct OllamaGenerator {
    chat_url: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let host = config.ollama_host.trim().trim_end_matches('/');
        if host.is_empty() {
            bail!("generator.backend is ollama but generator.ollama_host is empty");
        }
        if config.ollama_model.trim().is_empty() {
            bail!("generator.backend is ollama but generator.ollama_model is empty");
        }

        Ok(Self {
            chat_url: format!("{host}/api/chat"),
            model: config.ollama_model,
            temperature: config.temperature,
            client: Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl SuggestionGenerator for OllamaGenerator {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let chat = ChatRequest {
            model: &self.model,
            stream: false,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let request = self.client.post(&self.chat_url).json(&chat);
        let reply: ChatResponse = send_json(request, self.name()).await?;
        Ok(reply.message.content)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [ChatMessage<'a>; 2],
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    #[tokio::test]
    async fn reads_chat_message_content() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama3");
                assert_eq!(body["stream"], false);
                Json(json!({"message": {"role": "assistant", "content": "[]"}}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        let generator = OllamaGenerator::new(GeneratorConfig {
            ollama_host: format!("http://{addr}/"),
            ollama_model: "llama3".to_string(),
            ..GeneratorConfig::default()
        })
        .unwrap();
        assert_eq!(generator.generate("ideas").await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_body() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                (
                    axum::http::StatusCode::NOT_FOUND,
                    r#"{"error":"model \"llama3\" not found"}"#,
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        let generator = OllamaGenerator::new(GeneratorConfig {
            ollama_host: format!("http://{addr}"),
            ollama_model: "llama3".to_string(),
            ..GeneratorConfig::default()
        })
        .unwrap();
        let error = format!("{:#}", generator.generate("ideas").await.unwrap_err());
        assert!(error.contains("ollama API failed (404"), "{error}");
        assert!(error.contains("not found"), "{error}");
    }
}
