use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{chat_messages, LlmProvider, Message};

/// A local Ollama server. Responses are constrained to JSON with `format`.
pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, system_prompt: &str, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, messages),
            "format": "json",
            "stream": false,
            "options": { "temperature": 0 },
        })
    }
}

fn message_text(data: &Value) -> Option<&str> {
    data.pointer("/message/content")?.as_str()
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let data: Value = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&self.request_body(system_prompt, messages))
            .send()
            .await
            .context("failed to call Ollama API")?
            .error_for_status()
            .context("Ollama API returned error")?
            .json()
            .await
            .context("failed to parse Ollama response")?;

        message_text(&data)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing content in Ollama response"))
    }
}
