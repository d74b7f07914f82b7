//! Ollama provider implementation (local models)

pub mod chat;
pub mod embedding;
pub mod types;

pub use chat::OllamaChatProvider;
pub use embedding::OllamaEmbeddingProvider;

use crate::providers::{invalid_response, request_failed};
use lumen_core::LumenResult;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// POST a JSON body to an Ollama endpoint and decode the reply.
pub(crate) async fn post_json<Req: Serialize, Res: DeserializeOwned>(
    client: &Client,
    url: &str,
    body: &Req,
) -> LumenResult<Res> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| request_failed("ollama", 0, format!("HTTP request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(request_failed("ollama", status.as_u16() as i32, error_text));
    }

    response
        .json()
        .await
        .map_err(|e| invalid_response("ollama", format!("Failed to parse response: {}", e)))
}
