//! Ollama chat provider (local models)

use super::types::{ChatMessage, ChatOptions, ChatRequest, ChatResponse};
use super::{post_json, DEFAULT_BASE_URL};
use crate::{CompletionProvider, CompletionRequest};
use async_trait::async_trait;
use lumen_core::LumenResult;
use reqwest::Client;

pub struct OllamaChatProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaChatProvider {
    /// # Arguments
    /// * `base_url` - Ollama server URL (e.g., "http://localhost:11434")
    /// * `model` - Model name (e.g., "llama3.1", "mistral")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn with_default_url(model: impl Into<String>) -> Self {
        Self::new(DEFAULT_BASE_URL, model)
    }

    fn to_wire(&self, request: &CompletionRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for OllamaChatProvider {
    async fn complete(&self, request: &CompletionRequest) -> LumenResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let response: ChatResponse = post_json(&self.client, &url, &self.to_wire(request)).await?;
        Ok(response.message.content)
    }

    fn provider_id(&self) -> &str {
        "ollama"
    }
}

impl std::fmt::Debug for OllamaChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaChatProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_request_disables_streaming() {
        let provider = OllamaChatProvider::with_default_url("llama3.1");
        let wire = provider.to_wire(&CompletionRequest::prompt("hi", 0.1).with_max_tokens(800));
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 800);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
